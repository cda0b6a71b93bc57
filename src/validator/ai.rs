// src/validator/ai.rs
//
// AI composition topology checks.
//
// Agent nodes are wired to their sub-nodes (model, memory, tools, output
// parser) through dedicated connection classes; the sub-node is the source
// and the agent the target. These checks run in full mode only and may
// assume phase 1 established that every endpoint resolves to a real node.

use super::{codes, Diagnostic, Severity, SourceLocation};
use crate::catalog::CatalogStore;
use crate::core::{
    Workflow, CLASS_AI_LANGUAGE_MODEL, CLASS_AI_MEMORY, CLASS_AI_OUTPUT_PARSER, CLASS_AI_TOOL,
    CLASS_MAIN,
};
use serde_json::json;

pub fn check_workflow(workflow: &Workflow, catalog: &CatalogStore, issues: &mut Vec<Diagnostic>) {
    for node in &workflow.nodes {
        if is_agent(&node.node_type) {
            check_agent(workflow, node, issues);
        }
    }
    check_tools(workflow, catalog, issues);
}

fn is_agent(node_type: &str) -> bool {
    node_type.starts_with("@n8n/n8n-nodes-langchain.agent")
}

fn check_agent(workflow: &Workflow, node: &crate::core::Node, issues: &mut Vec<Diagnostic>) {
    let loc = SourceLocation::node(&node.name, &node.id);
    let params = &node.parameters;

    let models = workflow.incoming_of_class(&node.name, CLASS_AI_LANGUAGE_MODEL);
    let needs_fallback = params
        .get("needsFallback")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let allowed_models = if needs_fallback { 2 } else { 1 };

    if models.is_empty() {
        issues.push(
            Diagnostic::new(
                codes::AI_AGENT_MISSING_LANGUAGE_MODEL,
                Severity::Error,
                format!("agent '{}' has no language-model connection", node.name),
            )
            .at(loc.clone())
            .with_hint("connect a chat model to the agent's ai_languageModel input"),
        );
    } else if models.len() > allowed_models {
        issues.push(
            Diagnostic::new(
                codes::AI_AGENT_TOO_MANY_LANGUAGE_MODELS,
                Severity::Error,
                format!(
                    "agent '{}' has {} language-model connections but allows {allowed_models}",
                    node.name,
                    models.len()
                ),
            )
            .at(loc.clone())
            .with_context(json!({ "connected": models.len(), "allowed": allowed_models })),
        );
    }

    if needs_fallback && models.len() < 2 {
        issues.push(
            Diagnostic::new(
                codes::AI_FALLBACK_WITHOUT_SECOND_MODEL,
                Severity::Error,
                format!(
                    "agent '{}' enables a fallback model but only {} model(s) are connected",
                    node.name,
                    models.len()
                ),
            )
            .at(loc.clone()),
        );
    }

    let wants_parser = params
        .get("hasOutputParser")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if wants_parser
        && workflow
            .incoming_of_class(&node.name, CLASS_AI_OUTPUT_PARSER)
            .is_empty()
    {
        issues.push(
            Diagnostic::new(
                codes::AI_MISSING_OUTPUT_PARSER,
                Severity::Error,
                format!(
                    "agent '{}' sets hasOutputParser but no output parser is connected",
                    node.name
                ),
            )
            .at(loc.clone()),
        );
    }

    let streaming = params
        .get("options")
        .and_then(|o| o.get("streamResponse"))
        .or_else(|| params.get("streamResponse"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if streaming && workflow.has_output_at(&node.name, CLASS_MAIN, 0) {
        issues.push(
            Diagnostic::new(
                codes::AI_STREAMING_WITH_MAIN_OUTPUT,
                Severity::Error,
                format!(
                    "agent '{}' streams its response but also has a main output connection",
                    node.name
                ),
            )
            .at(loc.clone()),
        );
    }

    let memories = workflow.incoming_of_class(&node.name, CLASS_AI_MEMORY);
    if memories.len() > 1 {
        issues.push(
            Diagnostic::new(
                codes::AI_MULTIPLE_MEMORY,
                Severity::Error,
                format!(
                    "agent '{}' has {} memory connections; only one is supported",
                    node.name,
                    memories.len()
                ),
            )
            .at(loc.clone())
            .with_context(json!({ "connected": memories.len() })),
        );
    }

    let prompt_type = params
        .get("promptType")
        .and_then(|v| v.as_str())
        .unwrap_or("auto");
    if prompt_type == "define" {
        let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("");
        if text.trim().is_empty() {
            issues.push(
                Diagnostic::new(
                    codes::AI_EMPTY_PROMPT,
                    Severity::Error,
                    format!(
                        "agent '{}' uses promptType 'define' with an empty prompt",
                        node.name
                    ),
                )
                .at(loc.clone().with_path("parameters.text", "string")),
            );
        }
    }
}

/// Every source of an ai_tool connection is a tool and should describe
/// itself; the model picks tools by that description.
fn check_tools(workflow: &Workflow, catalog: &CatalogStore, issues: &mut Vec<Diagnostic>) {
    let mut flagged: Vec<&str> = Vec::new();
    let tool_sources: Vec<&str> = workflow
        .iter_endpoints()
        .filter(|(_, class, _)| *class == CLASS_AI_TOOL)
        .map(|(source, _, _)| source)
        .collect();

    for source in tool_sources {
        if flagged.contains(&source) {
            continue;
        }
        let Some(tool) = workflow.get_node(source) else {
            continue; // phase 1 already reported the dangling endpoint
        };

        // descriptionType "auto" derives the description from the schema.
        let auto_described = tool
            .parameters
            .get("descriptionType")
            .and_then(|v| v.as_str())
            .map(|s| s == "auto")
            .unwrap_or(false);
        let described = tool
            .parameters
            .get("toolDescription")
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);

        let known_tool = catalog
            .lookup_by_type(&tool.node_type)
            .ok()
            .flatten()
            .map(|r| r.is_ai_tool)
            .unwrap_or(true);

        if known_tool && !auto_described && !described {
            flagged.push(source);
            issues.push(
                Diagnostic::new(
                    codes::AI_TOOL_MISSING_DESCRIPTION,
                    Severity::Warning,
                    format!("tool '{}' has no toolDescription", source),
                )
                .at(SourceLocation::node(&tool.name, &tool.id)
                    .with_path("parameters.toolDescription", "missing"))
                .with_hint("models choose tools by description; add one or set descriptionType to auto"),
            );
        }
    }
}
