// src/validator/properties.rs
//
// Value-level checks of node parameters against the catalog's property
// schemas. Only present parameters are judged (missing required ones are
// the structural phase's business), and expression strings are exempt
// from kind checks since their runtime value is unknowable here.

use super::{codes, Diagnostic, Severity, SourceLocation};
use crate::catalog::{CatalogStore, PropertySpec};
use crate::core::Node;
use serde_json::{json, Value};

pub fn check_node(node: &Node, catalog: &CatalogStore, issues: &mut Vec<Diagnostic>) {
    let specs = match catalog.property_specs(&node.node_type, &node.type_version_string()) {
        Ok(specs) => specs,
        Err(e) => {
            issues.push(Diagnostic::new(
                codes::VALIDATOR_INTERNAL,
                Severity::Info,
                format!("property schema lookup failed in typing checker: {e}"),
            ));
            return;
        }
    };
    let Some(params) = node.parameters.as_object() else {
        return;
    };

    for spec in &specs {
        let Some(value) = params.get(&spec.name) else {
            continue;
        };
        check_value(node, spec, value, issues);
    }
}

fn check_value(node: &Node, spec: &PropertySpec, value: &Value, issues: &mut Vec<Diagnostic>) {
    // An expression resolves at runtime; its static kind proves nothing.
    if is_expression(value) {
        return;
    }
    let loc = SourceLocation::node(&node.name, &node.id)
        .with_path(format!("parameters.{}", spec.name), kind_of(value));

    let matches = match spec.kind.as_str() {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "options" | "multiOptions" => {
            // Kind first; membership below.
            value.is_string() || (spec.kind == "multiOptions" && value.is_array())
        }
        // Structured kinds (collection, fixedCollection, json, ...) have
        // their own per-node checks; no generic judgment here.
        _ => true,
    };

    if !matches {
        issues.push(
            Diagnostic::new(
                codes::PARAM_TYPE_MISMATCH,
                Severity::Warning,
                format!(
                    "node '{}' parameter '{}' is a {} but the schema expects {}",
                    node.name,
                    spec.name,
                    kind_of(value),
                    spec.kind
                ),
            )
            .at(loc)
            .with_context(json!({ "expected": spec.kind, "actual": kind_of(value) })),
        );
        return;
    }

    if spec.kind == "options" && !spec.options.is_empty() {
        if let Some(chosen) = value.as_str() {
            if !spec.options.iter().any(|o| o == chosen) {
                issues.push(
                    Diagnostic::new(
                        codes::PARAM_OPTION_UNKNOWN,
                        Severity::Warning,
                        format!(
                            "node '{}' parameter '{}' is '{chosen}', not one of [{}]",
                            node.name,
                            spec.name,
                            spec.options.join(", ")
                        ),
                    )
                    .at(loc)
                    .with_context(json!({ "value": chosen, "allowed": spec.options })),
                );
            }
        }
    }
}

fn is_expression(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| s.starts_with('=') || s.contains("{{"))
        .unwrap_or(false)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
