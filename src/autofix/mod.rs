// src/autofix/mod.rs
//
// =============================================================================
// N8N-CLI: AUTO-FIX ENGINE
// =============================================================================
//
// Turns a workflow (plus validator diagnostics) into a ranked list of
// typed fix operations, and optionally applies them to a fresh copy.
//
// Detectors run in a fixed order so the fix list is reproducible:
//   expression prefix -> switch/if options -> webhook path ->
//   node-type correction -> typeVersion correction -> error-output ->
//   typeVersion upgrade -> version-migration (informational).
//
// The original workflow is never mutated; application works on a deep
// copy through the jsonpath walker.

pub mod guidance;
pub mod migration;

use crate::catalog::{compare_versions, fuzzy, CatalogStore};
use crate::core::{Node, OnError, Workflow, CLASS_MAIN};
use crate::jsonpath::{self, FieldPath};
use crate::validator::{codes, Diagnostic, Mode, Profile, Validator};
use guidance::PostUpdateGuidance;
use migration::MigrationOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// 1. FIX OPERATIONS
// ============================================================================

/// The closed fix-type enumeration. Dispatch is exhaustive; the set does
/// not grow at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixType {
    ExpressionFormat,
    TypeversionCorrection,
    ErrorOutputConfig,
    NodeTypeCorrection,
    WebhookMissingPath,
    SwitchOptions,
    TypeversionUpgrade,
    VersionMigration,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::ExpressionFormat => "expression-format",
            FixType::TypeversionCorrection => "typeversion-correction",
            FixType::ErrorOutputConfig => "error-output-config",
            FixType::NodeTypeCorrection => "node-type-correction",
            FixType::WebhookMissingPath => "webhook-missing-path",
            FixType::SwitchOptions => "switch-options",
            FixType::TypeversionUpgrade => "typeversion-upgrade",
            FixType::VersionMigration => "version-migration",
        }
    }
}

/// Low < Medium < High. A fix may downgrade from its type's default band
/// based on context, never upgrade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

/// Metadata attached to typeversion-upgrade fixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMeta {
    pub new_type_version: String,
    pub applied: Vec<migration::AppliedMigration>,
    pub remaining: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOp {
    pub node_name: String,
    pub node_id: String,
    /// Dotted/indexed path relative to the node ("parameters.url",
    /// "typeVersion", "type").
    pub field: String,
    #[serde(rename = "type")]
    pub fix_type: FixType,
    /// None denotes insertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    /// None denotes deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub confidence: Confidence,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationMeta>,
}

// ============================================================================
// 2. CONFIGURATION & REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct FixConfig {
    /// Produce a modified workflow; the original is left intact.
    pub apply_fixes: bool,
    /// Subset filter; None keeps every type.
    pub fix_types: Option<Vec<FixType>>,
    /// Fixes ranked below this are dropped.
    pub confidence_threshold: Confidence,
    /// Hard cap after filtering.
    pub max_fixes: usize,
    /// Enable the typeversion-upgrade pipeline.
    pub upgrade_versions: bool,
    /// Promote informational version-migration fixes to applied. Nothing
    /// sets this today; the predicate stays configurable by design.
    pub apply_info_only: bool,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            apply_fixes: false,
            fix_types: None,
            confidence_threshold: Confidence::Low,
            max_fixes: 50,
            upgrade_versions: false,
            apply_info_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixStats {
    pub total: usize,
    pub applied: usize,
    pub by_type: BTreeMap<String, usize>,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixReport {
    pub fixes: Vec<FixOp>,
    pub stats: FixStats,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_workflow: Option<Workflow>,
    pub guidance: Vec<PostUpdateGuidance>,
}

// ============================================================================
// 3. THE ENGINE
// ============================================================================

pub struct FixEngine<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> FixEngine<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Generate (and optionally apply) fixes. When no diagnostics are
    /// passed, the engine runs a strict/full validation itself.
    pub fn generate_fixes(
        &self,
        workflow: &Workflow,
        diagnostics: Option<&[Diagnostic]>,
        config: &FixConfig,
    ) -> FixReport {
        let owned_report;
        let diagnostics: &[Diagnostic] = match diagnostics {
            Some(d) => d,
            None => {
                owned_report = Validator::new(self.catalog).validate(
                    workflow,
                    Profile::Strict,
                    Mode::Full,
                );
                &owned_report.issues
            }
        };

        let mut fixes: Vec<FixOp> = Vec::new();
        self.detect_expression_prefix(workflow, &mut fixes);
        self.detect_switch_options(workflow, &mut fixes);
        self.detect_webhook_path(workflow, &mut fixes);
        self.detect_node_type_correction(workflow, diagnostics, &mut fixes);
        self.detect_typeversion_correction(workflow, diagnostics, &mut fixes);
        self.detect_error_output(workflow, &mut fixes);
        if config.upgrade_versions {
            self.detect_typeversion_upgrade(workflow, &mut fixes);
        }
        self.detect_version_migration_info(workflow, &mut fixes);

        // Filtering: type subset, confidence threshold, hard cap.
        if let Some(kept_types) = &config.fix_types {
            fixes.retain(|f| kept_types.contains(&f.fix_type));
        }
        fixes.retain(|f| f.confidence >= config.confidence_threshold);
        fixes.truncate(config.max_fixes);

        let (modified_workflow, applied, guidance) = if config.apply_fixes {
            let (wf, applied, guidance) = self.apply_to(workflow, &fixes, config);
            (Some(wf), applied, guidance)
        } else {
            (None, 0, Vec::new())
        };

        let stats = build_stats(&fixes, applied);
        let summary = build_summary(&stats);
        FixReport {
            fixes,
            stats,
            summary,
            modified_workflow,
            guidance,
        }
    }

    // ------------------------------------------------------------------------
    // Detectors
    // ------------------------------------------------------------------------

    fn detect_expression_prefix(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            let mut strings: Vec<(String, String)> = Vec::new();
            collect_strings(&node.parameters, "parameters", 0, &mut strings);
            for (path, value) in strings {
                let opens = value.matches("{{").count();
                if opens == 0 || opens != value.matches("}}").count() {
                    continue; // unbalanced strings are a validation error, not fixable
                }
                if value.starts_with('=') {
                    continue;
                }
                fixes.push(FixOp {
                    node_name: node.name.clone(),
                    node_id: node.id.clone(),
                    field: path.clone(),
                    fix_type: FixType::ExpressionFormat,
                    before: Some(Value::String(value.clone())),
                    after: Some(Value::String(format!("={value}"))),
                    confidence: Confidence::High,
                    description: format!("prefix {path} with '=' so the expression is evaluated"),
                    migration: None,
                });
            }
        }
    }

    fn detect_switch_options(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            let short = short_name(&node.node_type);
            if short != "switch" && short != "if" {
                continue;
            }

            // Empty options objects confuse the editor's diff view; drop them.
            if node.parameters.get("options").map(is_empty_object) == Some(true) {
                fixes.push(FixOp {
                    node_name: node.name.clone(),
                    node_id: node.id.clone(),
                    field: "parameters.options".into(),
                    fix_type: FixType::SwitchOptions,
                    before: Some(json!({})),
                    after: None,
                    confidence: Confidence::High,
                    description: "remove empty options object".into(),
                    migration: None,
                });
            }

            if short == "switch" && node.type_version >= 3.0 {
                self.detect_switch_v3(node, fixes);
            }
            if short == "if" && node.type_version >= 2.0 {
                self.detect_if_conditions(node, fixes);
            }
        }
    }

    fn detect_switch_v3(&self, node: &Node, fixes: &mut Vec<FixOp>) {
        // v3 rules live at parameters.rules.values[i].conditions.
        if let Some(values) = node
            .parameters
            .get("rules")
            .and_then(|r| r.get("values"))
            .and_then(|v| v.as_array())
        {
            for (i, rule) in values.iter().enumerate() {
                let Some(conditions) = rule.get("conditions").filter(|c| c.is_object()) else {
                    continue;
                };
                if conditions.get("options").is_some() {
                    continue;
                }
                let mut options = json!({
                    "caseSensitive": true,
                    "leftValue": "",
                    "typeValidation": "strict",
                });
                if node.type_version >= 3.2 {
                    options["version"] = json!(2);
                }
                let field = format!("parameters.rules.values[{i}].conditions.options");
                fixes.push(FixOp {
                    node_name: node.name.clone(),
                    node_id: node.id.clone(),
                    field: field.clone(),
                    fix_type: FixType::SwitchOptions,
                    before: None,
                    after: Some(options),
                    confidence: Confidence::High,
                    description: format!("synthesize default conditions.options for rule {i}"),
                    migration: None,
                });
            }
        }

        // fallbackOutput belongs in options from v3 on. Expressed as a
        // delete/insert pair since fixes edit one field each.
        if let Some(fallback) = node
            .parameters
            .get("rules")
            .and_then(|r| r.get("fallbackOutput"))
            .cloned()
        {
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "parameters.options.fallbackOutput".into(),
                fix_type: FixType::SwitchOptions,
                before: None,
                after: Some(fallback.clone()),
                confidence: Confidence::High,
                description: "move fallbackOutput into options".into(),
                migration: None,
            });
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "parameters.rules.fallbackOutput".into(),
                fix_type: FixType::SwitchOptions,
                before: Some(fallback),
                after: None,
                confidence: Confidence::High,
                description: "remove fallbackOutput from rules".into(),
                migration: None,
            });
        }
    }

    fn detect_if_conditions(&self, node: &Node, fixes: &mut Vec<FixOp>) {
        let Some(conditions) = node.parameters.get("conditions").filter(|c| c.is_object()) else {
            return;
        };
        if conditions.get("options").is_some() {
            return;
        }
        fixes.push(FixOp {
            node_name: node.name.clone(),
            node_id: node.id.clone(),
            field: "parameters.conditions.options".into(),
            fix_type: FixType::SwitchOptions,
            before: None,
            after: Some(json!({
                "caseSensitive": true,
                "leftValue": "",
                "typeValidation": "strict",
            })),
            confidence: Confidence::High,
            description: "synthesize default conditions.options".into(),
            migration: None,
        });
    }

    fn detect_webhook_path(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            if short_name(&node.node_type) != "webhook" {
                continue;
            }
            let has_path = node
                .parameters
                .get("path")
                .and_then(|v| v.as_str())
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if has_path {
                continue;
            }
            let fresh = uuid::Uuid::new_v4().to_string();
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "parameters.path".into(),
                fix_type: FixType::WebhookMissingPath,
                before: None,
                after: Some(Value::String(fresh)),
                confidence: Confidence::High,
                description: if node.type_version < 2.0 {
                    "generate a webhook path and bump typeVersion to 2".into()
                } else {
                    "generate a webhook path".into()
                },
                migration: None,
            });
        }
    }

    fn detect_node_type_correction(
        &self,
        workflow: &Workflow,
        diagnostics: &[Diagnostic],
        fixes: &mut Vec<FixOp>,
    ) {
        for diag in diagnostics {
            if diag.code != codes::UNKNOWN_NODE_TYPE {
                continue;
            }
            let Some(node) = diag
                .location
                .as_ref()
                .and_then(|l| l.node_name.as_deref())
                .and_then(|name| workflow.get_node(name))
            else {
                continue;
            };
            let suggestions = match self.catalog.suggest_similar(&node.node_type, 1) {
                Ok(s) => s,
                Err(e) => {
                    log::debug!("similarity lookup failed for {}: {e}", node.node_type);
                    continue;
                }
            };
            let Some(best) = suggestions.first() else {
                continue;
            };
            if best.score < fuzzy::AUTOFIX_SUGGESTION_THRESHOLD {
                continue;
            }
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "type".into(),
                fix_type: FixType::NodeTypeCorrection,
                before: Some(Value::String(node.node_type.clone())),
                after: Some(Value::String(best.node_type.clone())),
                confidence: Confidence::High,
                description: format!(
                    "correct unknown type '{}' to '{}' (similarity {:.2})",
                    node.node_type, best.node_type, best.score
                ),
                migration: None,
            });
        }
    }

    fn detect_typeversion_correction(
        &self,
        workflow: &Workflow,
        diagnostics: &[Diagnostic],
        fixes: &mut Vec<FixOp>,
    ) {
        for diag in diagnostics {
            if diag.code != codes::TYPEVERSION_EXCEEDS_MAX {
                continue;
            }
            let Some(node) = diag
                .location
                .as_ref()
                .and_then(|l| l.node_name.as_deref())
                .and_then(|name| workflow.get_node(name))
            else {
                continue;
            };
            let Some(max) = diag
                .context
                .as_ref()
                .and_then(|c| c.get("maximum"))
                .and_then(|m| m.as_str())
                .and_then(|m| m.parse::<f64>().ok())
            else {
                continue;
            };
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "typeVersion".into(),
                fix_type: FixType::TypeversionCorrection,
                before: Some(json!(node.type_version)),
                after: Some(json!(max)),
                confidence: Confidence::Medium,
                description: format!(
                    "clamp typeVersion {} to the catalog maximum {max}",
                    node.type_version
                ),
                migration: None,
            });
        }
    }

    fn detect_error_output(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            if node.on_error != Some(OnError::ContinueErrorOutput) {
                continue;
            }
            // The error output is the extra trailing main branch; without
            // one the policy routes items nowhere.
            let has_error_branch = workflow
                .connections
                .get(&node.name)
                .and_then(|ports| ports.get(CLASS_MAIN))
                .map(|branches| branches.len() >= 2 && !branches[branches.len() - 1].is_empty())
                .unwrap_or(false);
            if has_error_branch {
                continue;
            }
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "onError".into(),
                fix_type: FixType::ErrorOutputConfig,
                before: serde_json::to_value(OnError::ContinueErrorOutput).ok(),
                after: None,
                confidence: Confidence::Medium,
                description: format!(
                    "'{}' routes errors to an error output that is not connected; remove onError",
                    node.name
                ),
                migration: None,
            });
        }
    }

    fn detect_typeversion_upgrade(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            let Ok(Some(record)) = self.catalog.lookup_by_type(&node.node_type) else {
                continue;
            };
            let current = node.type_version_string();
            let latest = record.latest_version().to_string();
            if compare_versions(&current, &latest) != Ordering::Less {
                continue;
            }

            let mut clone = node.clone();
            let MigrationOutcome {
                to_version,
                applied,
                remaining,
            } = migration::migrate(&mut clone, &latest);

            let crosses_breaking = migration::changes_in_range(&node.node_type, &current, &latest)
                .iter()
                .any(|c| c.is_breaking);
            let confidence = if crosses_breaking {
                Confidence::Medium
            } else if remaining.is_empty() {
                Confidence::High
            } else if remaining.len() <= 2 {
                Confidence::Medium
            } else {
                Confidence::Low
            };

            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "typeVersion".into(),
                fix_type: FixType::TypeversionUpgrade,
                before: Some(json!(node.type_version)),
                after: latest.parse::<f64>().ok().map(|v| json!(v)),
                confidence,
                description: format!(
                    "upgrade '{}' from typeVersion {current} to {to_version} ({} auto-migration(s), {} manual issue(s))",
                    node.name,
                    applied.len(),
                    remaining.len()
                ),
                migration: Some(MigrationMeta {
                    new_type_version: to_version,
                    applied,
                    remaining,
                }),
            });
        }
    }

    /// Informational only; never applied even under applyFixes. Scoped to
    /// outdated nodes so a fully upgraded workflow generates nothing.
    fn detect_version_migration_info(&self, workflow: &Workflow, fixes: &mut Vec<FixOp>) {
        for node in &workflow.nodes {
            let Ok(Some(record)) = self.catalog.lookup_by_type(&node.node_type) else {
                continue;
            };
            let current = node.type_version_string();
            let latest = record.latest_version();
            if compare_versions(&current, latest) != Ordering::Less {
                continue;
            }
            let changes: Vec<_> = migration::changes_in_range(&node.node_type, &current, latest)
                .into_iter()
                // Wildcard entries only concern nodes that still carry the
                // legacy property.
                .filter(|c| {
                    c.node_type != "*"
                        || node.parameters.get(c.property).is_some()
                        || node.extra.contains_key(c.property)
                })
                .collect();
            if changes.is_empty() {
                continue;
            }
            let recommendations: Vec<String> = changes
                .iter()
                .map(|c| format!("{}: {}", c.property, c.hint))
                .collect();
            fixes.push(FixOp {
                node_name: node.name.clone(),
                node_id: node.id.clone(),
                field: "typeVersion".into(),
                fix_type: FixType::VersionMigration,
                before: Some(json!(node.type_version)),
                after: None,
                confidence: Confidence::Low,
                description: format!(
                    "'{}' has {} registry change(s) between {current} and {latest}: {}",
                    node.name,
                    changes.len(),
                    recommendations.join("; ")
                ),
                migration: None,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------------

    /// Apply fixes to a deep copy of the workflow. Returns the copy, the
    /// number of fixes actually applied, and per-node guidance.
    pub fn apply_to(
        &self,
        workflow: &Workflow,
        fixes: &[FixOp],
        config: &FixConfig,
    ) -> (Workflow, usize, Vec<PostUpdateGuidance>) {
        let mut result = workflow.clone();
        let mut applied = 0usize;

        // Group by target node, keep field-path order within each group.
        let mut by_node: BTreeMap<String, Vec<&FixOp>> = BTreeMap::new();
        for fix in fixes {
            by_node.entry(fix.node_name.clone()).or_default().push(fix);
        }
        for group in by_node.values_mut() {
            group.sort_by(|a, b| a.field.cmp(&b.field));
        }

        for (node_name, group) in &by_node {
            let Some(node) = result.get_node_mut(node_name) else {
                log::warn!("fix targets unknown node '{node_name}'; skipped");
                continue;
            };

            let mut node_value = match serde_json::to_value(&*node) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("could not project node '{node_name}' for fixing: {e}");
                    continue;
                }
            };
            let mut upgrades: Vec<&MigrationMeta> = Vec::new();

            for fix in group {
                match fix.fix_type {
                    FixType::VersionMigration => {
                        // Informational; carries no concrete edit. The
                        // configurable predicate exists so a future mode
                        // can promote these once they do.
                        if config.apply_info_only {
                            log::debug!(
                                "version-migration fix for '{}' has no edit to apply",
                                fix.node_name
                            );
                        }
                        continue;
                    }
                    FixType::WebhookMissingPath => {
                        let Some(path_value) = fix.after.clone() else {
                            continue;
                        };
                        if apply_edit(&mut node_value, &fix.field, Some(path_value.clone())) {
                            // The server routes by webhookId; keep it in
                            // sync with the generated path.
                            let _ = apply_edit(&mut node_value, "webhookId", Some(path_value));
                            let below_v2 = node_value
                                .get("typeVersion")
                                .and_then(|v| v.as_f64())
                                .map(|v| v < 2.0)
                                .unwrap_or(true);
                            if below_v2 {
                                let _ = apply_edit(&mut node_value, "typeVersion", Some(json!(2.0)));
                            }
                            applied += 1;
                        }
                    }
                    FixType::TypeversionUpgrade => {
                        if let Some(meta) = &fix.migration {
                            if let Ok(version) = meta.new_type_version.parse::<f64>() {
                                if apply_edit(
                                    &mut node_value,
                                    "typeVersion",
                                    Some(json!(version)),
                                ) {
                                    upgrades.push(meta);
                                    applied += 1;
                                }
                            }
                        }
                    }
                    _ => {
                        if apply_edit(&mut node_value, &fix.field, fix.after.clone()) {
                            applied += 1;
                        }
                    }
                }
            }

            match serde_json::from_value::<Node>(node_value) {
                Ok(mut patched) => {
                    for meta in upgrades {
                        for sub in &meta.applied {
                            migration::replay(&mut patched, sub);
                        }
                    }
                    *node = patched;
                }
                Err(e) => {
                    log::warn!("fixes left node '{node_name}' unparseable, reverting: {e}");
                }
            }
        }

        let guidance = by_node
            .iter()
            .filter_map(|(name, group)| {
                let node_type = result
                    .get_node(name)
                    .map(|n| n.node_type.clone())
                    .unwrap_or_default();
                guidance::build(name, &node_type, group)
            })
            .collect();

        (result, applied, guidance)
    }
}

/// Set or delete one field on a node projection. Returns false when the
/// path cannot be parsed or written.
fn apply_edit(node_value: &mut Value, field: &str, after: Option<Value>) -> bool {
    let Ok(path) = FieldPath::parse(field) else {
        log::warn!("unparseable fix field path '{field}'");
        return false;
    };
    match after {
        Some(value) => jsonpath::set(node_value, &path, value).is_ok(),
        None => {
            jsonpath::delete(node_value, &path);
            true
        }
    }
}

// ============================================================================
// 4. HELPERS
// ============================================================================

fn short_name(node_type: &str) -> String {
    node_type
        .rsplit('.')
        .next()
        .unwrap_or(node_type)
        .to_lowercase()
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().map(|o| o.is_empty()).unwrap_or(false)
}

/// Collect every string leaf of a parameter tree with its dotted path.
/// Depth-capped like the validator's traversal.
fn collect_strings(value: &Value, path: &str, depth: usize, out: &mut Vec<(String, String)>) {
    if depth > crate::validator::expression::MAX_TRAVERSAL_DEPTH {
        return;
    }
    match value {
        Value::String(s) => out.push((path.to_string(), s.clone())),
        Value::Object(map) => {
            for (key, child) in map {
                collect_strings(child, &format!("{path}.{key}"), depth + 1, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_strings(child, &format!("{path}[{i}]"), depth + 1, out);
            }
        }
        _ => {}
    }
}

fn build_stats(fixes: &[FixOp], applied: usize) -> FixStats {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for fix in fixes {
        *by_type.entry(fix.fix_type.as_str().to_string()).or_default() += 1;
    }
    FixStats {
        total: fixes.len(),
        applied,
        by_type,
        high_confidence: fixes.iter().filter(|f| f.confidence == Confidence::High).count(),
        medium_confidence: fixes
            .iter()
            .filter(|f| f.confidence == Confidence::Medium)
            .count(),
        low_confidence: fixes.iter().filter(|f| f.confidence == Confidence::Low).count(),
    }
}

fn build_summary(stats: &FixStats) -> String {
    if stats.total == 0 {
        return "no fixable issues found".to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    for (kind, count) in &stats.by_type {
        parts.push(format!("{count} {kind}"));
    }
    let mut summary = format!(
        "{} fix(es): {} ({} high / {} medium / {} low confidence)",
        stats.total,
        parts.join(", "),
        stats.high_confidence,
        stats.medium_confidence,
        stats.low_confidence
    );
    if stats.applied > 0 {
        summary.push_str(&format!("; {} applied", stats.applied));
    }
    summary
}
