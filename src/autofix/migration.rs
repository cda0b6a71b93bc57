// src/autofix/migration.rs
//
// The BreakingChange registry and the per-node version-migration pipeline.
//
// Each entry describes what happened to one property between two versions
// of a node type, whether it can be migrated automatically and, if so,
// how. The wildcard node type "*" matches every node (the
// continueOnFail -> onError rename ships that way).

use crate::catalog::compare_versions;
use crate::core::{Node, OnError};
use crate::jsonpath::{self, FieldPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Renamed,
    TypeChanged,
    RequirementChanged,
    DefaultChanged,
}

/// How an auto-migratable change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Insert `property` with `value_json` when absent.
    AddProperty { value_json: &'static str },
    RemoveProperty,
    RenameProperty { to: &'static str },
    /// Overwrite `property` with `value_json`.
    SetDefault { value_json: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct BreakingChange {
    /// Full node type, or "*" for all nodes.
    pub node_type: &'static str,
    pub from_version: &'static str,
    pub to_version: &'static str,
    /// Dotted path under `parameters`, except the node-level legacy keys
    /// ("continueOnFail") which the migrator special-cases.
    pub property: &'static str,
    pub kind: ChangeKind,
    pub is_breaking: bool,
    pub hint: &'static str,
    /// Some(_) iff the change is auto-migratable.
    pub strategy: Option<Strategy>,
}

/// The curated registry, in application order.
pub const REGISTRY: &[BreakingChange] = &[
    BreakingChange {
        node_type: "*",
        from_version: "1",
        to_version: "99",
        property: "continueOnFail",
        kind: ChangeKind::Renamed,
        is_breaking: false,
        hint: "continueOnFail was replaced by the onError policy",
        strategy: Some(Strategy::RenameProperty { to: "onError" }),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.httpRequest",
        from_version: "2",
        to_version: "3",
        property: "requestMethod",
        kind: ChangeKind::Renamed,
        is_breaking: false,
        hint: "requestMethod is spelled method from v3 on",
        strategy: Some(Strategy::RenameProperty { to: "method" }),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.httpRequest",
        from_version: "2",
        to_version: "3",
        property: "responseFormat",
        kind: ChangeKind::Removed,
        is_breaking: true,
        hint: "response handling moved under options.response; re-create the setting there",
        strategy: None,
    },
    BreakingChange {
        node_type: "n8n-nodes-base.httpRequest",
        from_version: "2",
        to_version: "3",
        property: "jsonParameters",
        kind: ChangeKind::Removed,
        is_breaking: false,
        hint: "v3 always edits parameters structurally",
        strategy: Some(Strategy::RemoveProperty),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.set",
        from_version: "2",
        to_version: "3",
        property: "values",
        kind: ChangeKind::TypeChanged,
        is_breaking: true,
        hint: "v3 replaces values with typed assignments; rebuild the field list",
        strategy: None,
    },
    BreakingChange {
        node_type: "n8n-nodes-base.switch",
        from_version: "2",
        to_version: "3",
        property: "dataType",
        kind: ChangeKind::Removed,
        is_breaking: false,
        hint: "v3 infers the comparison type per rule",
        strategy: Some(Strategy::RemoveProperty),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.switch",
        from_version: "2",
        to_version: "3",
        property: "rules",
        kind: ChangeKind::TypeChanged,
        is_breaking: true,
        hint: "v3 rules carry typed conditions; review each rule after upgrading",
        strategy: None,
    },
    BreakingChange {
        node_type: "n8n-nodes-base.merge",
        from_version: "2",
        to_version: "3",
        property: "mode",
        kind: ChangeKind::DefaultChanged,
        is_breaking: false,
        hint: "the default mode became combine",
        strategy: Some(Strategy::SetDefault {
            value_json: "\"combine\"",
        }),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.webhook",
        from_version: "1",
        to_version: "2",
        property: "responseMode",
        kind: ChangeKind::DefaultChanged,
        is_breaking: false,
        hint: "v2 defaults to responding from the last node",
        strategy: Some(Strategy::AddProperty {
            value_json: "\"onReceived\"",
        }),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.code",
        from_version: "1",
        to_version: "2",
        property: "functionCode",
        kind: ChangeKind::Renamed,
        is_breaking: false,
        hint: "the script parameter is jsCode from v2 on",
        strategy: Some(Strategy::RenameProperty { to: "jsCode" }),
    },
    BreakingChange {
        node_type: "n8n-nodes-base.set",
        from_version: "1",
        to_version: "2",
        property: "keepOnlySet",
        kind: ChangeKind::Renamed,
        is_breaking: false,
        hint: "keepOnlySet became includeOtherFields with inverted meaning; review the flag",
        strategy: None,
    },
];

/// Changes whose (from, to) range overlaps (current, target), in registry
/// order. Wildcard entries match every node type.
pub fn changes_in_range(
    node_type: &str,
    current: &str,
    target: &str,
) -> Vec<&'static BreakingChange> {
    REGISTRY
        .iter()
        .filter(|c| c.node_type == "*" || c.node_type == node_type)
        .filter(|c| {
            // (current, target) ∩ (from, to) is non-empty.
            compare_versions(current, c.to_version) == Ordering::Less
                && compare_versions(c.from_version, target) == Ordering::Less
        })
        .collect()
}

// ============================================================================
// MIGRATION OUTCOME
// ============================================================================

/// One applied sub-migration, recorded so the fix can be replayed on a
/// fresh copy and audited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub property: String,
    /// "add_property" | "remove_property" | "rename_property" | "set_default"
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub to_version: String,
    pub applied: Vec<AppliedMigration>,
    /// Hints for the changes that need a human.
    pub remaining: Vec<String>,
}

/// Apply every auto-migratable change between the node's version and
/// `target`, in registry order, mutating `node` in place. Non-migratable
/// changes land in `remaining`.
pub fn migrate(node: &mut Node, target: &str) -> MigrationOutcome {
    let current = node.type_version_string();
    let mut applied = Vec::new();
    let mut remaining = Vec::new();

    for change in changes_in_range(&node.node_type, &current, target) {
        match change.strategy {
            None => remaining.push(format!("{}: {}", change.property, change.hint)),
            Some(strategy) => {
                if let Some(record) = apply_strategy(node, change.property, strategy) {
                    applied.push(record);
                }
            }
        }
    }

    if let Ok(version) = target.parse::<f64>() {
        node.type_version = version;
    }

    MigrationOutcome {
        to_version: target.to_string(),
        applied,
        remaining,
    }
}

/// Replay a recorded sub-migration against another copy of the node.
/// Used when the auto-fix engine applies a typeversion-upgrade fix.
pub fn replay(node: &mut Node, migration: &AppliedMigration) {
    match migration.action.as_str() {
        "remove_property" => {
            remove_param(node, &migration.property);
        }
        "rename_property" => {
            if migration.property == "continueOnFail" {
                if node.extra.remove("continueOnFail").is_some() {
                    node.on_error = migration
                        .new_value
                        .clone()
                        .and_then(|v| serde_json::from_value(v).ok());
                }
            } else if let Some(value) = remove_param(node, &migration.property) {
                if let Some(new_name) = migration.new_value.as_ref().and_then(|v| v.as_str()) {
                    set_param(node, new_name, value);
                }
            }
        }
        "add_property" | "set_default" => {
            if let Some(value) = migration.new_value.clone() {
                set_param(node, &migration.property, value);
            }
        }
        _ => {}
    }
}

fn apply_strategy(
    node: &mut Node,
    property: &str,
    strategy: Strategy,
) -> Option<AppliedMigration> {
    match strategy {
        Strategy::RemoveProperty => {
            let old = remove_param(node, property)?;
            Some(AppliedMigration {
                property: property.to_string(),
                action: "remove_property".into(),
                old_value: Some(old),
                new_value: None,
            })
        }
        Strategy::RenameProperty { to } => {
            // The continueOnFail rename crosses from parameters into the
            // typed onError field.
            if property == "continueOnFail" {
                return rename_continue_on_fail(node);
            }
            let old = remove_param(node, property)?;
            set_param(node, to, old.clone());
            Some(AppliedMigration {
                property: property.to_string(),
                action: "rename_property".into(),
                old_value: Some(old),
                new_value: Some(Value::String(to.to_string())),
            })
        }
        Strategy::AddProperty { value_json } => {
            if get_param(node, property).is_some() {
                return None;
            }
            let value: Value = serde_json::from_str(value_json).ok()?;
            set_param(node, property, value.clone());
            Some(AppliedMigration {
                property: property.to_string(),
                action: "add_property".into(),
                old_value: None,
                new_value: Some(value),
            })
        }
        Strategy::SetDefault { value_json } => {
            let value: Value = serde_json::from_str(value_json).ok()?;
            let old = get_param(node, property).cloned();
            if old.as_ref() == Some(&value) {
                return None;
            }
            set_param(node, property, value.clone());
            Some(AppliedMigration {
                property: property.to_string(),
                action: "set_default".into(),
                old_value: old,
                new_value: Some(value),
            })
        }
    }
}

fn rename_continue_on_fail(node: &mut Node) -> Option<AppliedMigration> {
    let old = node.extra.remove("continueOnFail")?;
    let continued = old.as_bool().unwrap_or(false);
    let policy = if continued {
        OnError::ContinueRegularOutput
    } else {
        OnError::StopWorkflow
    };
    node.on_error = Some(policy);
    Some(AppliedMigration {
        property: "continueOnFail".into(),
        action: "rename_property".into(),
        old_value: Some(old),
        new_value: serde_json::to_value(policy).ok(),
    })
}

// Path-walker helpers over the parameter tree.

fn get_param<'a>(node: &'a Node, property: &str) -> Option<&'a Value> {
    let path = FieldPath::parse(property).ok()?;
    jsonpath::get(&node.parameters, &path)
}

fn set_param(node: &mut Node, property: &str, value: Value) {
    if let Ok(path) = FieldPath::parse(property) {
        let _ = jsonpath::set(&mut node.parameters, &path, value);
    }
}

fn remove_param(node: &mut Node, property: &str) -> Option<Value> {
    let path = FieldPath::parse(property).ok()?;
    jsonpath::delete(&mut node.parameters, &path)
}
