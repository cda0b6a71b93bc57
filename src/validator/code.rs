// src/validator/code.rs
//
// Node-specific checks for code and SQL nodes.
//
// Code nodes execute user scripts inside the server's sandbox; the checks
// here catch the patterns the sandbox rejects at runtime (blocked Python
// imports, dynamic JS evaluation) plus the classic copy-paste hazards
// (mixed indentation, SQL string interpolation).

use super::{codes, Diagnostic, Severity, SourceLocation};
use crate::core::Node;
use serde_json::json;

/// Python modules the server-side sandbox refuses to import.
const BLOCKED_PYTHON_IMPORTS: &[&str] = &["os", "sys", "subprocess", "socket", "shutil", "ctypes"];

/// Node types whose string parameters are SQL statements.
const SQL_NODE_MARKERS: &[&str] = &["postgres", "mysql", "microsoftsql", "sqlite", "crateDb", "questDb", "snowflake"];

pub fn check_node(node: &Node, issues: &mut Vec<Diagnostic>) {
    let short = node
        .node_type
        .rsplit('.')
        .next()
        .unwrap_or(&node.node_type)
        .to_lowercase();

    if short == "code" || short == "function" || short == "functionitem" {
        check_code_node(node, issues);
    }
    if SQL_NODE_MARKERS.iter().any(|m| short.contains(&m.to_lowercase())) {
        check_sql_node(node, issues);
    }
}

fn check_code_node(node: &Node, issues: &mut Vec<Diagnostic>) {
    let params = &node.parameters;
    let language = params
        .get("language")
        .and_then(|v| v.as_str())
        .unwrap_or("javaScript");

    let (field, source) = ["jsCode", "pythonCode", "functionCode", "code"]
        .iter()
        .find_map(|f| {
            params
                .get(*f)
                .and_then(|v| v.as_str())
                .map(|s| (*f, s))
        })
        .unwrap_or(("jsCode", ""));

    if source.is_empty() {
        return;
    }
    let loc =
        SourceLocation::node(&node.name, &node.id).with_path(format!("parameters.{field}"), "string");

    if language.eq_ignore_ascii_case("python") {
        for line in source.lines() {
            let trimmed = line.trim_start();
            for blocked in BLOCKED_PYTHON_IMPORTS {
                let plain = format!("import {blocked}");
                let from = format!("from {blocked}");
                if trimmed.starts_with(&plain) || trimmed.starts_with(&from) {
                    issues.push(
                        Diagnostic::new(
                            codes::CODE_PYTHON_IMPORT_BLOCKED,
                            Severity::Warning,
                            format!(
                                "node '{}' imports '{blocked}', which the Python sandbox blocks",
                                node.name
                            ),
                        )
                        .at(loc.clone())
                        .with_context(json!({ "module": blocked })),
                    );
                }
            }
        }
    } else {
        for pattern in ["eval(", "new Function", "execSync(", "child_process"] {
            if source.contains(pattern) {
                issues.push(
                    Diagnostic::new(
                        codes::CODE_JS_DANGEROUS_EVAL,
                        Severity::Warning,
                        format!(
                            "node '{}' uses '{pattern}' which is rejected by the JS sandbox",
                            node.name
                        ),
                    )
                    .at(loc.clone())
                    .with_context(json!({ "pattern": pattern })),
                );
            }
        }
    }

    if has_mixed_indentation(source) {
        issues.push(
            Diagnostic::new(
                codes::CODE_MIXED_INDENTATION,
                Severity::Warning,
                format!("node '{}' mixes tab and space indentation", node.name),
            )
            .at(loc),
        );
    }
}

fn check_sql_node(node: &Node, issues: &mut Vec<Diagnostic>) {
    let Some(query) = node
        .parameters
        .get("query")
        .and_then(|v| v.as_str())
        .filter(|q| !q.is_empty())
    else {
        return;
    };

    // Template interpolation inside a SQL string builds the statement from
    // expression output; parameterized queries are the safe route.
    if query.contains("${") || query.contains("{{") {
        issues.push(
            Diagnostic::new(
                codes::SQL_TEMPLATE_INTERPOLATION,
                Severity::Warning,
                format!(
                    "node '{}' interpolates expression output into a SQL statement (injection risk)",
                    node.name
                ),
            )
            .at(SourceLocation::node(&node.name, &node.id)
                .with_path("parameters.query", "string"))
            .with_hint("use query parameters instead of string interpolation"),
        );
    }
}

fn has_mixed_indentation(source: &str) -> bool {
    let mut saw_tabs = false;
    let mut saw_spaces = false;
    for line in source.lines() {
        if line.starts_with('\t') {
            saw_tabs = true;
        } else if line.starts_with(' ') {
            saw_spaces = true;
        }
    }
    saw_tabs && saw_spaces
}
