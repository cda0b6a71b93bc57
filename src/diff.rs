// src/diff.rs
//
// =============================================================================
// N8N-CLI: SURGICAL DIFF ENGINE
// =============================================================================
//
// Applies a typed sequence of structural edits to a workflow.
//
// Semantics:
// - Default mode is all-or-nothing: every operation is checked against a
//   scratch copy in caller order; the first conflict aborts the batch and
//   the input workflow is untouched.
// - continueOnError applies each operation independently and records the
//   failures.
// - Symbolic branch parameters ("true"/"false" on if nodes, case N on
//   switch nodes) resolve through the catalog.
// - Renaming a node rewrites every connection that references it.
//
// Given the same workflow and operation list the output is byte-identical;
// connection maps are ordered containers.

use crate::catalog::CatalogStore;
use crate::core::{ConnectionEndpoint, ConnectionMap, Node, Workflow, CLASS_MAIN};
use crate::errors::CliError;
use crate::jsonpath::{self, FieldPath};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// 1. OPERATIONS (closed set)
// ============================================================================

fn default_class() -> String {
    CLASS_MAIN.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiffOp {
    AddNode {
        node: Node,
    },
    /// Also removes every connection touching the node.
    RemoveNode {
        name: String,
    },
    /// Partial patch of node fields keyed by dotted path ("parameters.url",
    /// "name", "notes"). A "name" key renames and propagates.
    UpdateNode {
        name: String,
        updates: Map<String, Value>,
    },
    MoveNode {
        name: String,
        position: [f64; 2],
    },
    EnableNode {
        name: String,
    },
    DisableNode {
        name: String,
    },
    AddConnection {
        source: String,
        target: String,
        #[serde(rename = "connectionType", default = "default_class")]
        connection_type: String,
        #[serde(rename = "sourceIndex", default, skip_serializing_if = "Option::is_none")]
        source_index: Option<u32>,
        #[serde(rename = "targetIndex", default)]
        target_index: u32,
        /// "true" | "false" for if nodes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        /// Output index by case number for switch nodes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case: Option<u32>,
    },
    RemoveConnection {
        source: String,
        target: String,
        #[serde(rename = "connectionType", default = "default_class")]
        connection_type: String,
        #[serde(rename = "sourceIndex", default, skip_serializing_if = "Option::is_none")]
        source_index: Option<u32>,
    },
    /// Re-point an existing connection at a new target.
    RewireConnection {
        source: String,
        from: String,
        to: String,
        #[serde(rename = "connectionType", default = "default_class")]
        connection_type: String,
        #[serde(rename = "sourceIndex", default, skip_serializing_if = "Option::is_none")]
        source_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        case: Option<u32>,
    },
    /// Drop every connection endpoint that references a missing node.
    CleanStaleConnections,
    ReplaceConnections {
        connections: ConnectionMap,
    },
    /// Shallow-merges the given keys into workflow settings.
    UpdateSettings {
        settings: Map<String, Value>,
    },
    UpdateName {
        name: String,
    },
    AddTag {
        tag: String,
    },
    RemoveTag {
        tag: String,
    },
    ActivateWorkflow,
    DeactivateWorkflow,
}

impl DiffOp {
    pub fn kind(&self) -> &'static str {
        match self {
            DiffOp::AddNode { .. } => "addNode",
            DiffOp::RemoveNode { .. } => "removeNode",
            DiffOp::UpdateNode { .. } => "updateNode",
            DiffOp::MoveNode { .. } => "moveNode",
            DiffOp::EnableNode { .. } => "enableNode",
            DiffOp::DisableNode { .. } => "disableNode",
            DiffOp::AddConnection { .. } => "addConnection",
            DiffOp::RemoveConnection { .. } => "removeConnection",
            DiffOp::RewireConnection { .. } => "rewireConnection",
            DiffOp::CleanStaleConnections => "cleanStaleConnections",
            DiffOp::ReplaceConnections { .. } => "replaceConnections",
            DiffOp::UpdateSettings { .. } => "updateSettings",
            DiffOp::UpdateName { .. } => "updateName",
            DiffOp::AddTag { .. } => "addTag",
            DiffOp::RemoveTag { .. } => "removeTag",
            DiffOp::ActivateWorkflow => "activateWorkflow",
            DiffOp::DeactivateWorkflow => "deactivateWorkflow",
        }
    }
}

// ============================================================================
// 2. OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Validate and report, but hand back the input workflow unchanged.
    pub dry_run: bool,
    /// Attempt every operation; collect failures instead of aborting.
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffError {
    pub index: usize,
    pub op: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub workflow: Workflow,
    pub applied: usize,
    pub errors: Vec<DiffError>,
}

// ============================================================================
// 3. THE ENGINE
// ============================================================================

pub struct DiffEngine<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> DiffEngine<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    pub fn apply(
        &self,
        workflow: &Workflow,
        ops: &[DiffOp],
        options: &DiffOptions,
    ) -> Result<DiffOutcome, CliError> {
        let mut scratch = workflow.clone();
        let mut applied = 0usize;
        let mut errors: Vec<DiffError> = Vec::new();

        for (index, op) in ops.iter().enumerate() {
            match self.apply_one(&mut scratch, op) {
                Ok(()) => applied += 1,
                Err(message) => {
                    if options.continue_on_error {
                        errors.push(DiffError {
                            index,
                            op: op.kind().to_string(),
                            message,
                        });
                    } else {
                        // All-or-nothing: the scratch copy is discarded and
                        // the caller's workflow was never touched.
                        return Err(CliError::conflict(format!(
                            "operation {index} ({}) failed: {message}",
                            op.kind()
                        )));
                    }
                }
            }
        }

        Ok(DiffOutcome {
            workflow: if options.dry_run {
                workflow.clone()
            } else {
                scratch
            },
            applied,
            errors,
        })
    }

    fn apply_one(&self, wf: &mut Workflow, op: &DiffOp) -> Result<(), String> {
        match op {
            DiffOp::AddNode { node } => {
                if wf.get_node(&node.name).is_some() {
                    return Err(format!("a node named '{}' already exists", node.name));
                }
                if !node.position[0].is_finite() || !node.position[1].is_finite() {
                    return Err(format!("node '{}' has a non-finite position", node.name));
                }
                wf.nodes.push(node.clone());
                Ok(())
            }

            DiffOp::RemoveNode { name } => {
                let before = wf.nodes.len();
                wf.nodes.retain(|n| n.name != *name);
                if wf.nodes.len() == before {
                    return Err(format!("no node named '{name}'"));
                }
                wf.remove_connections_touching(name);
                Ok(())
            }

            DiffOp::UpdateNode { name, updates } => self.update_node(wf, name, updates),

            DiffOp::MoveNode { name, position } => {
                if !position[0].is_finite() || !position[1].is_finite() {
                    return Err(format!("non-finite position for '{name}'"));
                }
                let node = wf
                    .get_node_mut(name)
                    .ok_or_else(|| format!("no node named '{name}'"))?;
                node.position = *position;
                Ok(())
            }

            DiffOp::EnableNode { name } => {
                let node = wf
                    .get_node_mut(name)
                    .ok_or_else(|| format!("no node named '{name}'"))?;
                node.disabled = None;
                Ok(())
            }

            DiffOp::DisableNode { name } => {
                let node = wf
                    .get_node_mut(name)
                    .ok_or_else(|| format!("no node named '{name}'"))?;
                node.disabled = Some(true);
                Ok(())
            }

            DiffOp::AddConnection {
                source,
                target,
                connection_type,
                source_index,
                target_index,
                branch,
                case,
            } => {
                if wf.get_node(target).is_none() {
                    return Err(format!("connection target '{target}' does not exist"));
                }
                let index = self.resolve_source_index(
                    wf,
                    source,
                    *source_index,
                    branch.as_deref(),
                    *case,
                )?;
                let ports = wf.connections.entry(source.clone()).or_default();
                let branches = ports.entry(connection_type.clone()).or_default();
                while branches.len() <= index as usize {
                    branches.push(Vec::new());
                }
                branches[index as usize].push(ConnectionEndpoint {
                    node: target.clone(),
                    connection_type: connection_type.clone(),
                    index: *target_index,
                });
                Ok(())
            }

            DiffOp::RemoveConnection {
                source,
                target,
                connection_type,
                source_index,
            } => {
                let ports = wf
                    .connections
                    .get_mut(source)
                    .ok_or_else(|| format!("'{source}' has no outgoing connections"))?;
                let branches = ports
                    .get_mut(connection_type)
                    .ok_or_else(|| format!("'{source}' has no {connection_type} connections"))?;
                let mut removed = 0usize;
                for (i, branch) in branches.iter_mut().enumerate() {
                    if let Some(s) = source_index {
                        if *s as usize != i {
                            continue;
                        }
                    }
                    let before = branch.len();
                    branch.retain(|ep| ep.node != *target);
                    removed += before - branch.len();
                }
                if removed == 0 {
                    return Err(format!(
                        "no {connection_type} connection from '{source}' to '{target}'"
                    ));
                }
                wf.prune_empty_connections();
                Ok(())
            }

            DiffOp::RewireConnection {
                source,
                from,
                to,
                connection_type,
                source_index,
                branch,
                case,
            } => {
                if wf.get_node(to).is_none() {
                    return Err(format!("rewire target '{to}' does not exist"));
                }
                let index = self.resolve_source_index(
                    wf,
                    source,
                    *source_index,
                    branch.as_deref(),
                    *case,
                )?;
                let ports = wf
                    .connections
                    .get_mut(source)
                    .ok_or_else(|| format!("'{source}' has no outgoing connections"))?;
                let branches = ports
                    .get_mut(connection_type)
                    .ok_or_else(|| format!("'{source}' has no {connection_type} connections"))?;
                let branch_eps = branches
                    .get_mut(index as usize)
                    .ok_or_else(|| format!("'{source}' has no branch {index}"))?;
                let mut rewired = 0usize;
                for ep in branch_eps.iter_mut() {
                    if ep.node == *from {
                        ep.node = to.clone();
                        rewired += 1;
                    }
                }
                if rewired == 0 {
                    return Err(format!(
                        "no {connection_type} connection from '{source}' branch {index} to '{from}'"
                    ));
                }
                Ok(())
            }

            DiffOp::CleanStaleConnections => {
                let names: Vec<String> =
                    wf.node_names().into_iter().map(str::to_string).collect();
                wf.connections
                    .retain(|source, _| names.iter().any(|n| n == source));
                for ports in wf.connections.values_mut() {
                    for branches in ports.values_mut() {
                        for branch in branches.iter_mut() {
                            branch.retain(|ep| names.iter().any(|n| *n == ep.node));
                        }
                    }
                }
                wf.prune_empty_connections();
                Ok(())
            }

            DiffOp::ReplaceConnections { connections } => {
                for (source, ports) in connections {
                    if wf.get_node(source).is_none() {
                        return Err(format!("replacement references unknown source '{source}'"));
                    }
                    for branches in ports.values() {
                        for ep in branches.iter().flatten() {
                            if wf.get_node(&ep.node).is_none() {
                                return Err(format!(
                                    "replacement references unknown target '{}'",
                                    ep.node
                                ));
                            }
                        }
                    }
                }
                wf.connections = connections.clone();
                Ok(())
            }

            DiffOp::UpdateSettings { settings } => {
                for (key, value) in settings {
                    wf.settings.insert(key.clone(), value.clone());
                }
                Ok(())
            }

            DiffOp::UpdateName { name } => {
                if name.trim().is_empty() {
                    return Err("workflow name must not be empty".to_string());
                }
                wf.name = name.clone();
                Ok(())
            }

            DiffOp::AddTag { tag } => {
                let tags = wf.tags.get_or_insert_with(Vec::new);
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
                Ok(())
            }

            DiffOp::RemoveTag { tag } => {
                let Some(tags) = wf.tags.as_mut() else {
                    return Err(format!("workflow has no tag '{tag}'"));
                };
                let before = tags.len();
                tags.retain(|t| t != tag);
                if tags.len() == before {
                    return Err(format!("workflow has no tag '{tag}'"));
                }
                Ok(())
            }

            DiffOp::ActivateWorkflow => {
                wf.active = Some(true);
                Ok(())
            }
            DiffOp::DeactivateWorkflow => {
                wf.active = Some(false);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // updateNode with rename propagation
    // ------------------------------------------------------------------------

    fn update_node(
        &self,
        wf: &mut Workflow,
        name: &str,
        updates: &Map<String, Value>,
    ) -> Result<(), String> {
        if wf.get_node(name).is_none() {
            return Err(format!("no node named '{name}'"));
        }

        // A rename must not collide with another node.
        let new_name = updates.get("name").and_then(|v| v.as_str());
        if let Some(new_name) = new_name {
            if new_name != name && wf.get_node(new_name).is_some() {
                return Err(format!(
                    "cannot rename '{name}' to '{new_name}': name is taken"
                ));
            }
        }

        // Patch through the node projection so dotted paths reach into
        // parameters uniformly.
        let Some(node) = wf.get_node_mut(name) else {
            return Err(format!("no node named '{name}'"));
        };
        let mut node_value =
            serde_json::to_value(&*node).map_err(|e| format!("node projection failed: {e}"))?;
        for (raw_path, value) in updates {
            let path = FieldPath::parse(raw_path).map_err(|e| e.to_string())?;
            jsonpath::set(&mut node_value, &path, value.clone()).map_err(|e| e.to_string())?;
        }
        let patched: Node = serde_json::from_value(node_value)
            .map_err(|e| format!("updates left the node unparseable: {e}"))?;
        *node = patched;

        if let Some(new_name) = new_name {
            if new_name != name {
                wf.rename_in_connections(name, new_name);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Symbolic parameter resolution
    // ------------------------------------------------------------------------

    /// Resolve the source output index from an explicit index, a symbolic
    /// if-branch, or a switch case, checking the node's declared arity.
    fn resolve_source_index(
        &self,
        wf: &Workflow,
        source: &str,
        explicit: Option<u32>,
        branch: Option<&str>,
        case: Option<u32>,
    ) -> Result<u32, String> {
        let node = wf
            .get_node(source)
            .ok_or_else(|| format!("connection source '{source}' does not exist"))?;

        let given = [explicit.is_some(), branch.is_some(), case.is_some()]
            .iter()
            .filter(|b| **b)
            .count();
        if given > 1 {
            return Err(
                "specify at most one of sourceIndex, branch and case".to_string(),
            );
        }

        if let Some(index) = explicit {
            return Ok(index);
        }

        let record = self
            .catalog
            .lookup_by_type(&node.node_type)
            .map_err(|e| format!("catalog lookup for '{}' failed: {e}", node.node_type))?;
        let short = node
            .node_type
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_lowercase();

        if let Some(symbol) = branch {
            if short != "if" {
                return Err(format!(
                    "branch '{symbol}' is only valid on if nodes, '{source}' is {}",
                    node.node_type
                ));
            }
            return match symbol {
                "true" => Ok(0),
                "false" => Ok(1),
                other => Err(format!("unknown branch '{other}' (expected true or false)")),
            };
        }

        if let Some(case_index) = case {
            if short != "switch" {
                return Err(format!(
                    "case {case_index} is only valid on switch nodes, '{source}' is {}",
                    node.node_type
                ));
            }
            // Variadic switches grow outputs from their rules; bound by
            // the current rule count when it is visible.
            let declared = match &record {
                Some(r) if !r.variadic_outputs => Some(r.output_arity),
                _ => node
                    .parameters
                    .get("rules")
                    .and_then(|r| r.get("values"))
                    .and_then(|v| v.as_array())
                    .map(|rules| rules.len() as u32),
            };
            if let Some(limit) = declared {
                if case_index >= limit {
                    return Err(format!(
                        "case {case_index} is out of range: '{source}' declares {limit} output(s)"
                    ));
                }
            }
            return Ok(case_index);
        }

        Ok(0)
    }
}
