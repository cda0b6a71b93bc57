// tests/workflow_parse.rs
//
// Strict/relaxed parsing, the caps, error positions and round-tripping.

use n8n_cli::errors::CliError;
use n8n_cli::parse::{parse_workflow, serialize_workflow, ParseOptions, MAX_NESTING_DEPTH};

const MINIMAL: &str = r#"{
    "name": "minimal",
    "nodes": [
        {
            "id": "1",
            "name": "Start",
            "type": "n8n-nodes-base.manualTrigger",
            "typeVersion": 1,
            "position": [0, 0],
            "parameters": {}
        }
    ],
    "connections": {}
}"#;

#[test]
fn strict_parse_accepts_plain_json() {
    let wf = parse_workflow(MINIMAL, &ParseOptions::default()).unwrap();
    assert_eq!(wf.name, "minimal");
    assert_eq!(wf.nodes.len(), 1);
    assert_eq!(wf.nodes[0].type_version, 1.0);
}

#[test]
fn parse_serialize_round_trip() {
    let wf = parse_workflow(MINIMAL, &ParseOptions::default()).unwrap();
    let text = serialize_workflow(&wf).unwrap();
    let again = parse_workflow(&text, &ParseOptions::default()).unwrap();
    assert_eq!(wf, again);
}

#[test]
fn unknown_fields_survive_the_round_trip() {
    let raw = r#"{
        "name": "extras",
        "nodes": [
            {
                "id": "1",
                "name": "Start",
                "type": "n8n-nodes-base.manualTrigger",
                "typeVersion": 1,
                "position": [0, 0],
                "parameters": {},
                "notesInFlow": true
            }
        ],
        "connections": {},
        "versionId": "abc-123"
    }"#;
    let wf = parse_workflow(raw, &ParseOptions::default()).unwrap();
    assert_eq!(wf.extra.get("versionId"), Some(&serde_json::json!("abc-123")));
    assert_eq!(
        wf.nodes[0].extra.get("notesInFlow"),
        Some(&serde_json::json!(true))
    );

    let text = serialize_workflow(&wf).unwrap();
    assert!(text.contains("versionId"));
    assert!(text.contains("notesInFlow"));
}

#[test]
fn strict_mode_reports_line_and_column() {
    let broken = "{\n  \"name\": \"x\",\n  \"nodes\": [}\n}";
    match parse_workflow(broken, &ParseOptions::default()) {
        Err(CliError::ParseFailed { line, column, .. }) => {
            assert_eq!(line, 3);
            assert!(column > 0);
        }
        other => panic!("expected ParseFailed, got {other:?}"),
    }
}

#[test]
fn relaxed_mode_accepts_comments_trailing_commas_and_bare_keys() {
    let relaxed = r#"{
        // a workflow with editor junk in it
        name: "relaxed",
        /* block comment */
        "nodes": [
            {
                id: "1",
                name: "Start",
                type: "n8n-nodes-base.manualTrigger",
                typeVersion: 1,
                position: [0, 0],
                parameters: {},
            },
        ],
        connections: {},
    }"#;

    // Strict refuses...
    assert!(parse_workflow(relaxed, &ParseOptions::default()).is_err());
    // ...relaxed repairs.
    let wf = parse_workflow(relaxed, &ParseOptions { relaxed: true }).unwrap();
    assert_eq!(wf.name, "relaxed");
    assert_eq!(wf.nodes[0].node_type, "n8n-nodes-base.manualTrigger");
}

#[test]
fn relaxed_mode_leaves_string_contents_alone() {
    let raw = r#"{
        name: "tricky // not a comment",
        "nodes": [
            {
                id: "1",
                name: "Start",
                type: "n8n-nodes-base.manualTrigger",
                typeVersion: 1,
                position: [0, 0],
                parameters: { "note": "braces { } and , commas stay" },
            },
        ],
        connections: {},
    }"#;
    let wf = parse_workflow(raw, &ParseOptions { relaxed: true }).unwrap();
    assert_eq!(wf.name, "tricky // not a comment");
    assert_eq!(
        wf.nodes[0].parameters["note"],
        serde_json::json!("braces { } and , commas stay")
    );
}

#[test]
fn size_cap_rejects_oversized_documents() {
    let huge = format!(
        "{{\"name\": \"big\", \"nodes\": [], \"connections\": {{}}, \"pad\": \"{}\"}}",
        "x".repeat(11 * 1024 * 1024)
    );
    match parse_workflow(&huge, &ParseOptions::default()) {
        Err(CliError::ParseFailed { message, .. }) => assert!(message.contains("cap")),
        other => panic!("expected ParseFailed, got {other:?}"),
    }
}

#[test]
fn nesting_cap_rejects_deep_documents() {
    let mut inner = String::from("1");
    for _ in 0..(MAX_NESTING_DEPTH + 5) {
        inner = format!("{{\"d\": {inner}}}");
    }
    let doc = format!("{{\"name\": \"deep\", \"nodes\": [], \"connections\": {{}}, \"x\": {inner}}}");
    let result = parse_workflow(&doc, &ParseOptions::default());
    match result {
        Err(CliError::ParseFailed { message, .. }) => {
            assert!(message.contains("depth") || message.contains("recursion"));
        }
        other => panic!("expected ParseFailed, got {other:?}"),
    }
}

#[test]
fn non_workflow_json_is_rejected_with_a_parse_error() {
    let result = parse_workflow("[1, 2, 3]", &ParseOptions::default());
    assert!(matches!(result, Err(CliError::ParseFailed { .. })));
}
