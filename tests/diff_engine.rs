// tests/diff_engine.rs
//
// Operation semantics, symbolic branch resolution, rename propagation,
// atomicity and determinism.

mod common;

use common::{connect, node, workflow};
use n8n_cli::catalog::CatalogStore;
use n8n_cli::core::{Workflow, CLASS_MAIN};
use n8n_cli::diff::{DiffEngine, DiffOp, DiffOptions};
use n8n_cli::errors::CliError;
use serde_json::{json, Map};

fn open_store(dir: &tempfile::TempDir) -> CatalogStore {
    CatalogStore::open(common::build_catalog(dir.path(), true)).unwrap()
}

fn updates(pairs: &[(&str, serde_json::Value)]) -> Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn two_node_workflow() -> Workflow {
    let mut wf = workflow(
        "pair",
        vec![
            node("A", "n8n-nodes-base.manualTrigger", 1.0),
            node("B", "n8n-nodes-base.httpRequest", 3.0),
        ],
    );
    connect(&mut wf, "A", CLASS_MAIN, 0, "B");
    wf
}

#[test]
fn rename_propagates_through_connections() {
    // A -> B, rename A to A2.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![DiffOp::UpdateNode {
        name: "A".into(),
        updates: updates(&[("name", json!("A2"))]),
    }];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();

    assert!(outcome.workflow.connections.get("A").is_none());
    let a2 = outcome.workflow.connections.get("A2").expect("A2 entry");
    assert_eq!(a2[CLASS_MAIN][0][0].node, "B");
    assert!(outcome.workflow.get_node("A2").is_some());
    // No connection references the old name anywhere.
    assert!(outcome
        .workflow
        .iter_endpoints()
        .all(|(src, _, ep)| src != "A" && ep.node != "A"));
}

#[test]
fn rename_to_taken_name_fails_the_operation() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![DiffOp::UpdateNode {
        name: "A".into(),
        updates: updates(&[("name", json!("B"))]),
    }];
    assert!(matches!(
        engine.apply(&wf, &ops, &DiffOptions::default()),
        Err(CliError::Conflict { .. })
    ));
}

#[test]
fn symbolic_branches_resolve_on_if_nodes() {
    // if-node C wired symbolically: true -> ok, false -> err.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = workflow(
        "branches",
        vec![
            node("C", "n8n-nodes-base.if", 2.0),
            node("ok", "n8n-nodes-base.httpRequest", 3.0),
            node("err", "n8n-nodes-base.httpRequest", 3.0),
        ],
    );

    let ops = vec![
        DiffOp::AddConnection {
            source: "C".into(),
            target: "ok".into(),
            connection_type: CLASS_MAIN.into(),
            source_index: None,
            target_index: 0,
            branch: Some("true".into()),
            case: None,
        },
        DiffOp::AddConnection {
            source: "C".into(),
            target: "err".into(),
            connection_type: CLASS_MAIN.into(),
            source_index: None,
            target_index: 0,
            branch: Some("false".into()),
            case: None,
        },
    ];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();

    let branches = &outcome.workflow.connections["C"][CLASS_MAIN];
    assert_eq!(branches[0][0].node, "ok");
    assert_eq!(branches[1][0].node, "err");
}

#[test]
fn case_numbers_resolve_on_switch_nodes_with_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let mut switch = node("Route", "n8n-nodes-base.switch", 3.0);
    switch.parameters = json!({ "rules": { "values": [ {}, {} ] } });
    let wf = workflow(
        "cases",
        vec![switch, node("X", "n8n-nodes-base.httpRequest", 3.0)],
    );

    let connect_case = |case: u32| {
        vec![DiffOp::AddConnection {
            source: "Route".into(),
            target: "X".into(),
            connection_type: CLASS_MAIN.into(),
            source_index: None,
            target_index: 0,
            branch: None,
            case: Some(case),
        }]
    };

    let ok = engine
        .apply(&wf, &connect_case(1), &DiffOptions::default())
        .unwrap();
    assert_eq!(ok.workflow.connections["Route"][CLASS_MAIN][1][0].node, "X");

    // Two rules -> case 5 is out of range.
    assert!(matches!(
        engine.apply(&wf, &connect_case(5), &DiffOptions::default()),
        Err(CliError::Conflict { .. })
    ));
}

#[test]
fn branch_symbols_reject_wrong_node_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![DiffOp::AddConnection {
        source: "B".into(),
        target: "A".into(),
        connection_type: CLASS_MAIN.into(),
        source_index: None,
        target_index: 0,
        branch: Some("true".into()),
        case: None,
    }];
    assert!(engine.apply(&wf, &ops, &DiffOptions::default()).is_err());
}

#[test]
fn remove_node_drops_its_connections() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let mut wf = two_node_workflow();
    wf.nodes.push(node("C", "n8n-nodes-base.set", 3.0));
    connect(&mut wf, "B", CLASS_MAIN, 0, "C");

    let ops = vec![DiffOp::RemoveNode { name: "B".into() }];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();

    assert!(outcome.workflow.get_node("B").is_none());
    assert!(outcome
        .workflow
        .iter_endpoints()
        .all(|(src, _, ep)| src != "B" && ep.node != "B"));
}

#[test]
fn atomicity_nothing_applies_when_one_op_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();
    let before = serde_json::to_string(&wf).unwrap();

    let ops = vec![
        DiffOp::AddNode {
            node: node("New", "n8n-nodes-base.set", 3.0),
        },
        DiffOp::RemoveNode {
            name: "Ghost".into(), // fails
        },
    ];
    let result = engine.apply(&wf, &ops, &DiffOptions::default());
    assert!(result.is_err());
    // The input value is untouched.
    assert_eq!(serde_json::to_string(&wf).unwrap(), before);
}

#[test]
fn continue_on_error_records_failures_and_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![
        DiffOp::RemoveNode {
            name: "Ghost".into(), // fails
        },
        DiffOp::AddNode {
            node: node("New", "n8n-nodes-base.set", 3.0),
        },
    ];
    let outcome = engine
        .apply(
            &wf,
            &ops,
            &DiffOptions {
                continue_on_error: true,
                ..DiffOptions::default()
            },
        )
        .unwrap();

    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].index, 0);
    assert_eq!(outcome.errors[0].op, "removeNode");
    assert!(outcome.workflow.get_node("New").is_some());
}

#[test]
fn dry_run_reports_but_does_not_change_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![DiffOp::DisableNode { name: "B".into() }];
    let outcome = engine
        .apply(
            &wf,
            &ops,
            &DiffOptions {
                dry_run: true,
                ..DiffOptions::default()
            },
        )
        .unwrap();

    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.workflow, wf);
}

#[test]
fn apply_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![
        DiffOp::AddNode {
            node: node("C", "n8n-nodes-base.set", 3.0),
        },
        DiffOp::AddConnection {
            source: "B".into(),
            target: "C".into(),
            connection_type: CLASS_MAIN.into(),
            source_index: None,
            target_index: 0,
            branch: None,
            case: None,
        },
        DiffOp::UpdateSettings {
            settings: updates(&[("executionOrder", json!("v1"))]),
        },
        DiffOp::AddTag { tag: "prod".into() },
        DiffOp::ActivateWorkflow,
    ];

    let a = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();
    let b = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();
    assert_eq!(
        serde_json::to_string(&a.workflow).unwrap(),
        serde_json::to_string(&b.workflow).unwrap()
    );
}

#[test]
fn node_state_and_workflow_level_ops() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![
        DiffOp::DisableNode { name: "B".into() },
        DiffOp::MoveNode {
            name: "B".into(),
            position: [640.0, 480.0],
        },
        DiffOp::UpdateName {
            name: "renamed workflow".into(),
        },
        DiffOp::AddTag { tag: "x".into() },
        DiffOp::AddTag { tag: "x".into() }, // second add is a no-op
        DiffOp::DeactivateWorkflow,
    ];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();
    let b = outcome.workflow.get_node("B").unwrap();
    assert_eq!(b.disabled, Some(true));
    assert_eq!(b.position, [640.0, 480.0]);
    assert_eq!(outcome.workflow.name, "renamed workflow");
    assert_eq!(outcome.workflow.tags.as_deref(), Some(&["x".to_string()][..]));
    assert_eq!(outcome.workflow.active, Some(false));

    // Enable restores.
    let ops = vec![DiffOp::EnableNode { name: "B".into() }];
    let outcome = engine
        .apply(&outcome.workflow, &ops, &DiffOptions::default())
        .unwrap();
    assert_eq!(outcome.workflow.get_node("B").unwrap().disabled, None);
}

#[test]
fn clean_stale_connections_sweeps_dangling_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let mut wf = two_node_workflow();
    // Inject stale entries by hand.
    connect(&mut wf, "A", CLASS_MAIN, 0, "Ghost");
    connect(&mut wf, "Phantom", CLASS_MAIN, 0, "B");

    let ops = vec![DiffOp::CleanStaleConnections];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();

    assert!(outcome.workflow.connections.get("Phantom").is_none());
    assert!(outcome
        .workflow
        .iter_endpoints()
        .all(|(_, _, ep)| ep.node != "Ghost"));
    // The legitimate A -> B connection survived.
    assert_eq!(outcome.workflow.connections["A"][CLASS_MAIN][0][0].node, "B");
}

#[test]
fn rewire_and_remove_connections() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let mut wf = two_node_workflow();
    wf.nodes.push(node("C", "n8n-nodes-base.set", 3.0));

    let ops = vec![DiffOp::RewireConnection {
        source: "A".into(),
        from: "B".into(),
        to: "C".into(),
        connection_type: CLASS_MAIN.into(),
        source_index: None,
        branch: None,
        case: None,
    }];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();
    assert_eq!(outcome.workflow.connections["A"][CLASS_MAIN][0][0].node, "C");

    let ops = vec![DiffOp::RemoveConnection {
        source: "A".into(),
        target: "C".into(),
        connection_type: CLASS_MAIN.into(),
        source_index: None,
    }];
    let outcome = engine
        .apply(&outcome.workflow, &ops, &DiffOptions::default())
        .unwrap();
    assert!(outcome.workflow.connections.get("A").is_none());
}

#[test]
fn update_node_patches_parameters_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let engine = DiffEngine::new(&store);
    let wf = two_node_workflow();

    let ops = vec![DiffOp::UpdateNode {
        name: "B".into(),
        updates: updates(&[
            ("parameters.url", json!("https://example.com/v2")),
            ("parameters.options.timeout", json!(5000)),
        ]),
    }];
    let outcome = engine.apply(&wf, &ops, &DiffOptions::default()).unwrap();
    let b = outcome.workflow.get_node("B").unwrap();
    assert_eq!(b.parameters["url"], json!("https://example.com/v2"));
    assert_eq!(b.parameters["options"]["timeout"], json!(5000));
}

#[test]
fn operations_deserialize_from_tagged_json() {
    let raw = json!([
        { "type": "updateName", "name": "renamed" },
        { "type": "addConnection", "source": "A", "target": "B", "branch": "true" },
        { "type": "cleanStaleConnections" },
        { "type": "activateWorkflow" }
    ]);
    let ops: Vec<DiffOp> = serde_json::from_value(raw).unwrap();
    assert_eq!(ops.len(), 4);
    assert_eq!(ops[0].kind(), "updateName");
    assert_eq!(ops[1].kind(), "addConnection");
    match &ops[1] {
        DiffOp::AddConnection {
            connection_type,
            branch,
            ..
        } => {
            assert_eq!(connection_type, CLASS_MAIN);
            assert_eq!(branch.as_deref(), Some("true"));
        }
        other => panic!("unexpected op {other:?}"),
    }
}
