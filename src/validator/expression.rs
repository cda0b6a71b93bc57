// src/validator/expression.rs
//
// Expression-format checks over node parameter trees.
//
// The rule is universal: any parameter string containing `{{ ... }}` must
// start with `=` or the server stores it as a literal. The check applies
// to every node type and carries confidence 1.0 in its context so the
// auto-fix engine can act without second-guessing.

use super::{codes, Diagnostic, Severity, SourceLocation};
use crate::core::Node;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Hard cap on parameter-tree depth. Values parsed from JSON are acyclic,
/// but the cap (plus a pointer-keyed visited set as a safeguard) bounds
/// traversal of anything a caller constructs by hand.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

pub fn check_node(node: &Node, issues: &mut Vec<Diagnostic>) {
    let mut walker = Walker {
        node,
        issues,
        visited: HashSet::new(),
        depth_exceeded: false,
    };
    walker.walk(&node.parameters, "parameters", 0);
}

struct Walker<'a> {
    node: &'a Node,
    issues: &'a mut Vec<Diagnostic>,
    visited: HashSet<*const Value>,
    depth_exceeded: bool,
}

impl Walker<'_> {
    fn walk(&mut self, value: &Value, path: &str, depth: usize) {
        if depth > MAX_TRAVERSAL_DEPTH {
            // One bounded warning per node, never a crash.
            if !self.depth_exceeded {
                self.depth_exceeded = true;
                self.issues.push(
                    Diagnostic::new(
                        codes::EXPRESSION_DEPTH_EXCEEDED,
                        Severity::Warning,
                        format!(
                            "parameter tree of node '{}' exceeds depth {MAX_TRAVERSAL_DEPTH}; deeper values were not inspected",
                            self.node.name
                        ),
                    )
                    .at(SourceLocation::node(&self.node.name, &self.node.id)),
                );
            }
            return;
        }
        if !self.visited.insert(value as *const Value) {
            return;
        }

        match value {
            Value::String(s) => self.check_string(s, path),
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = format!("{path}.{key}");
                    self.walk(child, &child_path, depth + 1);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    let child_path = format!("{path}[{i}]");
                    self.walk(child, &child_path, depth + 1);
                }
            }
            _ => {}
        }
    }

    fn check_string(&mut self, s: &str, path: &str) {
        let opens = s.matches("{{").count();
        let closes = s.matches("}}").count();
        if opens == 0 && closes == 0 {
            return;
        }

        let loc = SourceLocation::node(&self.node.name, &self.node.id).with_path(path, "string");

        if opens != closes {
            self.issues.push(
                Diagnostic::new(
                    codes::EXPRESSION_UNBALANCED,
                    Severity::Error,
                    format!("unbalanced expression braces in {path}"),
                )
                .at(loc)
                .with_context(json!({ "opens": opens, "closes": closes })),
            );
            return;
        }

        if has_empty_expression(s) {
            self.issues.push(
                Diagnostic::new(
                    codes::EXPRESSION_EMPTY,
                    Severity::Warning,
                    format!("empty expression {{{{ }}}} in {path}"),
                )
                .at(loc.clone()),
            );
        }

        if s.contains("${") {
            self.issues.push(
                Diagnostic::new(
                    codes::EXPRESSION_TEMPLATE_LITERAL,
                    Severity::Warning,
                    format!(
                        "{path} mixes JS template-literal syntax `${{...}}` into an n8n expression"
                    ),
                )
                .at(loc.clone())
                .with_hint("n8n expressions interpolate with {{ ... }}, not ${ ... }"),
            );
        }

        if !s.starts_with('=') {
            self.issues.push(
                Diagnostic::new(
                    codes::EXPRESSION_MISSING_PREFIX,
                    Severity::Error,
                    format!("{path} contains {{{{ ... }}}} but lacks the '=' prefix, so it is stored as a literal"),
                )
                .at(loc)
                .with_context(json!({ "confidence": 1.0 }))
                .with_hint("prefix the value with '=' to have it evaluated"),
            );
        }
    }
}

/// `{{ }}` with only whitespace inside.
fn has_empty_expression(s: &str) -> bool {
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            if after[..end].trim().is_empty() {
                return true;
            }
            rest = &after[end + 2..];
        } else {
            return false;
        }
    }
    false
}
