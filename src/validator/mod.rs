// src/validator/mod.rs
//
// =============================================================================
// N8N-CLI: WORKFLOW VALIDATOR
// =============================================================================
//
// Schema-aware static analysis of workflow documents.
//
// Phases run in a fixed order so later checks may assume what earlier ones
// established: structural -> property typing -> expression format ->
// node-specific semantics -> AI topology -> version checks.
//
// Contract: the validator never fails on user input. Internal trouble
// (e.g. a catalog read error) is reported as an info diagnostic naming the
// checker, and validation continues.

pub mod ai;
pub mod code;
pub mod expression;
pub mod properties;

use crate::autofix::migration;
use crate::catalog::{compare_versions, CatalogStore};
use crate::core::{Workflow, CLASS_MAIN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

// ============================================================================
// 1. DIAGNOSTICS
// ============================================================================

/// Stable diagnostic codes. The auto-fix engine dispatches on these;
/// renaming one is a breaking change.
pub mod codes {
    // Structural
    pub const MISSING_REQUIRED_PROPERTY: &str = "MISSING_REQUIRED_PROPERTY";
    pub const NODE_MISSING_REQUIRED: &str = "NODE_MISSING_REQUIRED";
    pub const DUPLICATE_NODE_NAME: &str = "DUPLICATE_NODE_NAME";
    pub const UNKNOWN_NODE_TYPE: &str = "UNKNOWN_NODE_TYPE";
    pub const EXTERNAL_NODE_TYPE: &str = "EXTERNAL_NODE_TYPE";
    pub const TYPEVERSION_EXCEEDS_MAX: &str = "TYPEVERSION_EXCEEDS_MAX";
    pub const INVALID_POSITION: &str = "INVALID_POSITION";
    pub const INVALID_CONNECTION: &str = "INVALID_CONNECTION";
    pub const BRANCH_INDEX_OUT_OF_RANGE: &str = "BRANCH_INDEX_OUT_OF_RANGE";
    pub const NESTED_VALUES_COLLECTION: &str = "NESTED_VALUES_COLLECTION";

    // Parameter typing
    pub const PARAM_TYPE_MISMATCH: &str = "PARAM_TYPE_MISMATCH";
    pub const PARAM_OPTION_UNKNOWN: &str = "PARAM_OPTION_UNKNOWN";

    // Expressions
    pub const EXPRESSION_MISSING_PREFIX: &str = "EXPRESSION_MISSING_PREFIX";
    pub const EXPRESSION_UNBALANCED: &str = "EXPRESSION_UNBALANCED";
    pub const EXPRESSION_EMPTY: &str = "EXPRESSION_EMPTY";
    pub const EXPRESSION_TEMPLATE_LITERAL: &str = "EXPRESSION_TEMPLATE_LITERAL";
    pub const EXPRESSION_DEPTH_EXCEEDED: &str = "EXPRESSION_DEPTH_EXCEEDED";

    // Code / SQL nodes
    pub const CODE_PYTHON_IMPORT_BLOCKED: &str = "CODE_PYTHON_IMPORT_BLOCKED";
    pub const CODE_JS_DANGEROUS_EVAL: &str = "CODE_JS_DANGEROUS_EVAL";
    pub const CODE_MIXED_INDENTATION: &str = "CODE_MIXED_INDENTATION";
    pub const SQL_TEMPLATE_INTERPOLATION: &str = "SQL_TEMPLATE_INTERPOLATION";

    // AI topology
    pub const AI_AGENT_MISSING_LANGUAGE_MODEL: &str = "AI_AGENT_MISSING_LANGUAGE_MODEL";
    pub const AI_AGENT_TOO_MANY_LANGUAGE_MODELS: &str = "AI_AGENT_TOO_MANY_LANGUAGE_MODELS";
    pub const AI_FALLBACK_WITHOUT_SECOND_MODEL: &str = "AI_FALLBACK_WITHOUT_SECOND_MODEL";
    pub const AI_MISSING_OUTPUT_PARSER: &str = "AI_MISSING_OUTPUT_PARSER";
    pub const AI_STREAMING_WITH_MAIN_OUTPUT: &str = "AI_STREAMING_WITH_MAIN_OUTPUT";
    pub const AI_MULTIPLE_MEMORY: &str = "AI_MULTIPLE_MEMORY";
    pub const AI_TOOL_MISSING_DESCRIPTION: &str = "AI_TOOL_MISSING_DESCRIPTION";
    pub const AI_EMPTY_PROMPT: &str = "AI_EMPTY_PROMPT";

    // Versioning
    pub const TYPEVERSION_OUTDATED: &str = "TYPEVERSION_OUTDATED";
    pub const BREAKING_CHANGE_PENDING: &str = "BREAKING_CHANGE_PENDING";

    // Internal
    pub const VALIDATOR_INTERNAL: &str = "VALIDATOR_INTERNAL";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Dotted path into the parameter tree, when the issue is value-level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Kind of the offending value ("string", "object", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<String>,
}

impl SourceLocation {
    pub fn node(name: &str, id: &str) -> Self {
        Self {
            node_name: Some(name.to_string()),
            node_id: Some(id.to_string()),
            path: None,
            value_kind: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>, value_kind: &str) -> Self {
        self.path = Some(path.into());
        self.value_kind = Some(value_kind.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity,
            message: message.into(),
            location: None,
            context: None,
            hint: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// 2. PROFILES & MODES
// ============================================================================

/// Which diagnostics survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    Minimal,
    #[default]
    Runtime,
    AiFriendly,
    Strict,
}

/// How deep inspection goes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Structure,
    Operation,
    #[default]
    Full,
}

/// Errors that even the minimal profile keeps.
const CRITICAL_CODES: &[&str] = &[
    codes::MISSING_REQUIRED_PROPERTY,
    codes::NODE_MISSING_REQUIRED,
    codes::DUPLICATE_NODE_NAME,
    codes::UNKNOWN_NODE_TYPE,
    codes::INVALID_CONNECTION,
    codes::TYPEVERSION_EXCEEDS_MAX,
];

/// Security / deprecation / runtime-impacting warnings the runtime
/// profile keeps.
const RUNTIME_WARNING_CODES: &[&str] = &[
    codes::CODE_PYTHON_IMPORT_BLOCKED,
    codes::CODE_JS_DANGEROUS_EVAL,
    codes::SQL_TEMPLATE_INTERPOLATION,
    codes::TYPEVERSION_OUTDATED,
    codes::BREAKING_CHANGE_PENDING,
    codes::EXPRESSION_DEPTH_EXCEEDED,
    codes::PARAM_TYPE_MISMATCH,
    codes::PARAM_OPTION_UNKNOWN,
];

fn survives(profile: Profile, d: &Diagnostic) -> bool {
    match profile {
        Profile::Strict => true,
        Profile::Minimal => {
            d.severity == Severity::Error && CRITICAL_CODES.contains(&d.code.as_str())
        }
        Profile::Runtime => match d.severity {
            Severity::Error => true,
            Severity::Warning => RUNTIME_WARNING_CODES.contains(&d.code.as_str()),
            Severity::Info => false,
        },
        Profile::AiFriendly => match d.severity {
            Severity::Error | Severity::Warning => true,
            // Best-practice hints are the point of this profile; internal
            // notices stay behind strict.
            Severity::Info => d.code != codes::VALIDATOR_INTERNAL,
        },
    }
}

// ============================================================================
// 3. REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStats {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub nodes_visited: usize,
    pub profile: Profile,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<Diagnostic>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.stats.errors > 0
    }
}

// ============================================================================
// 4. THE VALIDATOR
// ============================================================================

pub struct Validator<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    pub fn validate(&self, workflow: &Workflow, profile: Profile, mode: Mode) -> ValidationReport {
        let mut issues: Vec<Diagnostic> = Vec::new();

        // Phase 1: structural shape.
        self.check_top_level(workflow, &mut issues);
        self.check_nodes_structural(workflow, &mut issues);
        self.check_connections(workflow, &mut issues);

        if mode >= Mode::Operation {
            // Phase 2: parameter values and expressions.
            for node in &workflow.nodes {
                if is_official_package(&node.node_type) {
                    properties::check_node(node, self.catalog, &mut issues);
                }
                expression::check_node(node, &mut issues);
                code::check_node(node, &mut issues);
                self.check_nested_values(node, &mut issues);
            }
        }

        if mode >= Mode::Full {
            // Phase 3: cross-node semantics and version hygiene.
            // Earlier phases established that endpoints resolve, so the AI
            // checks index nodes by name without re-verifying.
            ai::check_workflow(workflow, self.catalog, &mut issues);
            self.check_versions(workflow, &mut issues);
        }

        let kept: Vec<Diagnostic> = issues.into_iter().filter(|d| survives(profile, d)).collect();
        let stats = ValidationStats {
            errors: kept.iter().filter(|d| d.severity == Severity::Error).count(),
            warnings: kept
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count(),
            infos: kept.iter().filter(|d| d.severity == Severity::Info).count(),
            nodes_visited: workflow.nodes.len(),
            profile,
            mode,
        };
        ValidationReport {
            issues: kept,
            stats,
        }
    }

    // ------------------------------------------------------------------------
    // Phase 1: structure
    // ------------------------------------------------------------------------

    fn check_top_level(&self, workflow: &Workflow, issues: &mut Vec<Diagnostic>) {
        if workflow.name.trim().is_empty() {
            issues.push(
                Diagnostic::new(
                    codes::MISSING_REQUIRED_PROPERTY,
                    Severity::Error,
                    "workflow is missing a name",
                )
                .with_context(json!({ "property": "name" })),
            );
        }
        if workflow.nodes.is_empty() {
            issues.push(Diagnostic::new(
                codes::MISSING_REQUIRED_PROPERTY,
                Severity::Warning,
                "workflow has no nodes",
            ));
        }
        for name in workflow.duplicate_node_names() {
            issues.push(
                Diagnostic::new(
                    codes::DUPLICATE_NODE_NAME,
                    Severity::Error,
                    format!("node name '{name}' is used more than once"),
                )
                .with_context(json!({ "name": name })),
            );
        }
    }

    fn check_nodes_structural(&self, workflow: &Workflow, issues: &mut Vec<Diagnostic>) {
        for node in &workflow.nodes {
            let loc = SourceLocation::node(&node.name, &node.id);

            if !node.position[0].is_finite() || !node.position[1].is_finite() {
                issues.push(
                    Diagnostic::new(
                        codes::INVALID_POSITION,
                        Severity::Error,
                        format!("node '{}' has a non-finite position", node.name),
                    )
                    .at(loc.clone()),
                );
            }

            if !is_official_package(&node.node_type) {
                issues.push(
                    Diagnostic::new(
                        codes::EXTERNAL_NODE_TYPE,
                        Severity::Info,
                        format!(
                            "node '{}' uses external type '{}'; schema checks skipped",
                            node.name, node.node_type
                        ),
                    )
                    .at(loc),
                );
                continue;
            }

            match self.catalog.lookup_by_type(&node.node_type) {
                Ok(Some(record)) => {
                    // typeVersion must not exceed the catalog maximum.
                    let declared = node.type_version_string();
                    let max = record.latest_version();
                    if compare_versions(&declared, max) == Ordering::Greater {
                        issues.push(
                            Diagnostic::new(
                                codes::TYPEVERSION_EXCEEDS_MAX,
                                Severity::Error,
                                format!(
                                    "node '{}' declares typeVersion {declared} but the maximum for {} is {max}",
                                    node.name, node.node_type
                                ),
                            )
                            .at(loc.clone())
                            .with_context(json!({ "declared": declared, "maximum": max })),
                        );
                    }

                    let params = node.parameters.as_object();
                    for required in &record.required_properties {
                        let present = params.map(|p| p.contains_key(required)).unwrap_or(false);
                        if !present {
                            issues.push(
                                Diagnostic::new(
                                    codes::NODE_MISSING_REQUIRED,
                                    Severity::Error,
                                    format!(
                                        "node '{}' is missing required property '{required}'",
                                        node.name
                                    ),
                                )
                                .at(loc.clone().with_path(required.clone(), "missing"))
                                .with_context(json!({ "property": required })),
                            );
                        }
                    }
                }
                Ok(None) => {
                    issues.push(
                        Diagnostic::new(
                            codes::UNKNOWN_NODE_TYPE,
                            Severity::Error,
                            format!(
                                "node '{}' has unknown type '{}'",
                                node.name, node.node_type
                            ),
                        )
                        .at(loc)
                        .with_context(json!({ "type": node.node_type })),
                    );
                }
                Err(e) => {
                    issues.push(Diagnostic::new(
                        codes::VALIDATOR_INTERNAL,
                        Severity::Info,
                        format!("catalog lookup failed in node checker: {e}"),
                    ));
                }
            }
        }
    }

    fn check_connections(&self, workflow: &Workflow, issues: &mut Vec<Diagnostic>) {
        let names: HashSet<&str> = workflow.node_names();

        for (source, ports) in &workflow.connections {
            if !names.contains(source.as_str()) {
                issues.push(
                    Diagnostic::new(
                        codes::INVALID_CONNECTION,
                        Severity::Error,
                        format!("connection source '{source}' is not a node in this workflow"),
                    )
                    .with_context(json!({ "source": source })),
                );
                continue;
            }

            // Branch-index bounds against declared arity (variadic exempt).
            let arity = workflow.get_node(source).and_then(|n| {
                self.catalog
                    .lookup_by_type(&n.node_type)
                    .ok()
                    .flatten()
                    .filter(|r| !r.variadic_outputs)
                    .map(|r| r.output_arity as usize)
            });

            for (class, branches) in ports {
                if let Some(arity) = arity {
                    if class == CLASS_MAIN && branches.len() > arity {
                        issues.push(
                            Diagnostic::new(
                                codes::BRANCH_INDEX_OUT_OF_RANGE,
                                Severity::Error,
                                format!(
                                    "'{source}' uses output branch {} but declares only {arity} output(s)",
                                    branches.len() - 1
                                ),
                            )
                            .with_context(
                                json!({ "source": source, "branches": branches.len(), "arity": arity }),
                            ),
                        );
                    }
                }
                for branch in branches {
                    for ep in branch {
                        if !names.contains(ep.node.as_str()) {
                            issues.push(
                                Diagnostic::new(
                                    codes::INVALID_CONNECTION,
                                    Severity::Error,
                                    format!(
                                        "connection {source} -> {} ({class}) targets a node that does not exist",
                                        ep.node
                                    ),
                                )
                                .with_context(json!({ "source": source, "target": ep.node })),
                            );
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 2 helper: the nested values.values fixed-collection bug
    // ------------------------------------------------------------------------

    fn check_nested_values(&self, node: &crate::core::Node, issues: &mut Vec<Diagnostic>) {
        // The well-known exported-workflow corruption: a fixedCollection
        // parameter serialized as { "values": { "values": [...] } }.
        let Some(params) = node.parameters.as_object() else {
            return;
        };
        for (key, value) in params {
            let Some(inner) = value.as_object().and_then(|o| o.get("values")) else {
                continue;
            };
            if inner.as_object().map(|o| o.contains_key("values")) == Some(true) {
                issues.push(
                    Diagnostic::new(
                        codes::NESTED_VALUES_COLLECTION,
                        Severity::Error,
                        format!(
                            "node '{}' parameter '{key}' has a doubly-nested values collection",
                            node.name
                        ),
                    )
                    .at(SourceLocation::node(&node.name, &node.id)
                        .with_path(format!("{key}.values.values"), "object")),
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Phase 3: versions
    // ------------------------------------------------------------------------

    fn check_versions(&self, workflow: &Workflow, issues: &mut Vec<Diagnostic>) {
        for node in &workflow.nodes {
            let Ok(Some(record)) = self.catalog.lookup_by_type(&node.node_type) else {
                continue;
            };
            let declared = node.type_version_string();
            let latest = record.latest_version();
            if compare_versions(&declared, latest) == Ordering::Less {
                issues.push(
                    Diagnostic::new(
                        codes::TYPEVERSION_OUTDATED,
                        Severity::Warning,
                        format!(
                            "node '{}' is at typeVersion {declared}; {} is available",
                            node.name, latest
                        ),
                    )
                    .at(SourceLocation::node(&node.name, &node.id))
                    .with_context(json!({ "declared": declared, "latest": latest })),
                );

                let changes =
                    migration::changes_in_range(&record.node_type, &declared, latest);
                let breaking: Vec<_> = changes.iter().filter(|c| c.is_breaking).collect();
                if !breaking.is_empty() {
                    issues.push(
                        Diagnostic::new(
                            codes::BREAKING_CHANGE_PENDING,
                            Severity::Warning,
                            format!(
                                "upgrading '{}' from {declared} to {latest} crosses {} breaking change(s)",
                                node.name,
                                breaking.len()
                            ),
                        )
                        .at(SourceLocation::node(&node.name, &node.id))
                        .with_context(json!({
                            "properties": breaking.iter().map(|c| c.property.clone()).collect::<Vec<_>>(),
                        })),
                    );
                }
            }
        }
    }
}

/// Types we hold catalog schemas for. Anything else is community-published
/// and only gets universal checks.
pub fn is_official_package(node_type: &str) -> bool {
    node_type.starts_with("n8n-nodes-base.") || node_type.starts_with("@n8n/")
}
