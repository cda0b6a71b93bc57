// tests/common/mod.rs
//
// Shared fixtures: a scratch catalog file with a representative slice of
// node types, and small builders for workflows under test.

use n8n_cli::catalog::{CatalogBuilder, CatalogRow};
use n8n_cli::core::{ConnectionEndpoint, Node, Workflow};
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn build_catalog(dir: &Path, with_fts: bool) -> PathBuf {
    let path = dir.join("nodes.db");
    let mut builder = CatalogBuilder::create(&path, with_fts).expect("create catalog");

    let rows = vec![
        row("n8n-nodes-base.httpRequest", "1", "HTTP Request", "Core Nodes", 1, false),
        row("n8n-nodes-base.httpRequest", "2", "HTTP Request", "Core Nodes", 1, false),
        http_request_v3_row(),
        row("n8n-nodes-base.webhook", "1", "Webhook", "Core Nodes", 1, true),
        row("n8n-nodes-base.webhook", "2", "Webhook", "Core Nodes", 1, true),
        two_output_row("n8n-nodes-base.if", "1", "If"),
        two_output_row("n8n-nodes-base.if", "2", "If"),
        variadic_row("n8n-nodes-base.switch", "2", "Switch"),
        variadic_row("n8n-nodes-base.switch", "3", "Switch"),
        variadic_row("n8n-nodes-base.switch", "3.2", "Switch"),
        row("n8n-nodes-base.set", "2", "Edit Fields (Set)", "Core Nodes", 1, false),
        row("n8n-nodes-base.set", "3", "Edit Fields (Set)", "Core Nodes", 1, false),
        row("n8n-nodes-base.code", "1", "Code", "Core Nodes", 1, false),
        row("n8n-nodes-base.code", "2", "Code", "Core Nodes", 1, false),
        row("n8n-nodes-base.postgres", "1", "Postgres", "Data & Storage", 1, false),
        row("n8n-nodes-base.postgres", "2", "Postgres", "Data & Storage", 1, false),
        row("n8n-nodes-base.merge", "2", "Merge", "Core Nodes", 1, false),
        row("n8n-nodes-base.merge", "3", "Merge", "Core Nodes", 1, false),
        row("n8n-nodes-base.gmail", "1", "Gmail", "Communication", 1, false),
        row("n8n-nodes-base.gmailTrigger", "1", "Gmail Trigger", "Communication", 1, true),
        row("n8n-nodes-base.manualTrigger", "1", "Manual Trigger", "Core Nodes", 1, true),
        agent_row("1"),
        agent_row("1.7"),
        ai_row("@n8n/n8n-nodes-langchain.lmChatOpenAi", "OpenAI Chat Model", false),
        ai_row("@n8n/n8n-nodes-langchain.toolHttpRequest", "HTTP Request Tool", true),
        ai_row("@n8n/n8n-nodes-langchain.memoryBufferWindow", "Simple Memory", false),
        ai_row("@n8n/n8n-nodes-langchain.outputParserStructured", "Structured Output Parser", false),
    ];

    for r in &rows {
        builder.insert(r).expect("insert catalog row");
    }
    path
}

fn row(
    node_type: &str,
    version: &str,
    display: &str,
    category: &str,
    arity: u32,
    is_trigger: bool,
) -> CatalogRow {
    CatalogRow {
        node_type: node_type.to_string(),
        version: version.to_string(),
        display_name: display.to_string(),
        category: category.to_string(),
        package: package_of(node_type),
        description: format!("{display} node"),
        is_trigger,
        is_webhook: node_type.ends_with("webhook"),
        output_classes: vec!["main".to_string()],
        output_arity: arity,
        properties: json!([]),
        ..Default::default()
    }
}

/// The one row with a fleshed-out property schema, for value-level
/// validation tests.
fn http_request_v3_row() -> CatalogRow {
    CatalogRow {
        properties: json!([
            { "name": "url", "displayName": "URL", "type": "string", "required": true },
            {
                "name": "method",
                "displayName": "Method",
                "type": "options",
                "options": [
                    { "name": "DELETE", "value": "DELETE" },
                    { "name": "GET", "value": "GET" },
                    { "name": "PATCH", "value": "PATCH" },
                    { "name": "POST", "value": "POST" },
                    { "name": "PUT", "value": "PUT" }
                ]
            },
            { "name": "sendBody", "displayName": "Send Body", "type": "boolean" },
            { "name": "options", "displayName": "Options", "type": "collection" }
        ]),
        ..row("n8n-nodes-base.httpRequest", "3", "HTTP Request", "Core Nodes", 1, false)
    }
}

fn two_output_row(node_type: &str, version: &str, display: &str) -> CatalogRow {
    CatalogRow {
        output_arity: 2,
        ..row(node_type, version, display, "Core Nodes", 2, false)
    }
}

fn variadic_row(node_type: &str, version: &str, display: &str) -> CatalogRow {
    CatalogRow {
        variadic_outputs: true,
        output_arity: 4,
        ..row(node_type, version, display, "Core Nodes", 4, false)
    }
}

fn agent_row(version: &str) -> CatalogRow {
    CatalogRow {
        node_type: "@n8n/n8n-nodes-langchain.agent".to_string(),
        version: version.to_string(),
        display_name: "AI Agent".to_string(),
        category: "AI".to_string(),
        package: "@n8n/n8n-nodes-langchain".to_string(),
        description: "Autonomous agent node".to_string(),
        output_classes: vec!["main".to_string()],
        output_arity: 1,
        properties: json!([]),
        ..Default::default()
    }
}

fn ai_row(node_type: &str, display: &str, is_ai_tool: bool) -> CatalogRow {
    CatalogRow {
        node_type: node_type.to_string(),
        version: "1".to_string(),
        display_name: display.to_string(),
        category: "AI".to_string(),
        package: "@n8n/n8n-nodes-langchain".to_string(),
        description: format!("{display} sub-node"),
        is_ai_tool,
        output_classes: vec!["main".to_string()],
        output_arity: 1,
        properties: json!([]),
        ..Default::default()
    }
}

fn package_of(node_type: &str) -> String {
    node_type
        .rsplit_once('.')
        .map(|(pkg, _)| pkg.to_string())
        .unwrap_or_default()
}

// -----------------------------------------------------------------------------
// Workflow builders
// -----------------------------------------------------------------------------

pub fn node(name: &str, node_type: &str, version: f64) -> Node {
    let mut n = Node::new(name, node_type);
    n.type_version = version;
    n.position = [100.0, 200.0];
    n
}

pub fn workflow(name: &str, nodes: Vec<Node>) -> Workflow {
    let mut wf = Workflow::new(name);
    wf.nodes = nodes;
    wf
}

/// Wire source -> target on the given class and branch index.
pub fn connect(wf: &mut Workflow, source: &str, class: &str, branch: usize, target: &str) {
    let ports = wf.connections.entry(source.to_string()).or_default();
    let branches = ports.entry(class.to_string()).or_default();
    while branches.len() <= branch {
        branches.push(Vec::new());
    }
    branches[branch].push(ConnectionEndpoint {
        node: target.to_string(),
        connection_type: class.to_string(),
        index: 0,
    });
}
