// tests/validator_rules.rs
//
// Diagnostic families, profiles, modes and the traversal depth cap.

mod common;

use common::{connect, node, workflow};
use n8n_cli::catalog::CatalogStore;
use n8n_cli::core::{OnError, CLASS_AI_LANGUAGE_MODEL, CLASS_AI_TOOL, CLASS_MAIN};
use n8n_cli::validator::{codes, Mode, Profile, Severity, Validator};
use serde_json::{json, Value};

fn open_store(dir: &tempfile::TempDir) -> CatalogStore {
    CatalogStore::open(common::build_catalog(dir.path(), true)).unwrap()
}

fn codes_of(report: &n8n_cli::validator::ValidationReport) -> Vec<&str> {
    report.issues.iter().map(|d| d.code.as_str()).collect()
}

#[test]
fn clean_workflow_validates_clean() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut http = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    http.parameters = json!({ "url": "https://example.com" });
    let mut wf = workflow("clean", vec![node("Start", "n8n-nodes-base.manualTrigger", 1.0), http]);
    connect(&mut wf, "Start", CLASS_MAIN, 0, "Fetch");

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Full);
    assert_eq!(report.stats.errors, 0, "issues: {:?}", report.issues);
}

#[test]
fn structural_errors_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut wf = workflow(
        "broken",
        vec![
            node("A", "n8n-nodes-base.httpRequest", 1.0),
            node("A", "n8n-nodes-base.httpRequest", 1.0),
            node("Mystery", "n8n-nodes-base.thisDoesNotExist", 1.0),
            node("Future", "n8n-nodes-base.httpRequest", 9.0),
        ],
    );
    connect(&mut wf, "A", CLASS_MAIN, 0, "Ghost");

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Structure);
    let codes = codes_of(&report);
    assert!(codes.contains(&codes::DUPLICATE_NODE_NAME));
    assert!(codes.contains(&codes::UNKNOWN_NODE_TYPE));
    assert!(codes.contains(&codes::TYPEVERSION_EXCEEDS_MAX));
    assert!(codes.contains(&codes::INVALID_CONNECTION));
}

#[test]
fn typeversion_exceeds_max_carries_the_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let wf = workflow("v", vec![node("Fetch", "n8n-nodes-base.httpRequest", 9.0)]);
    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Structure);
    let diag = report
        .issues
        .iter()
        .find(|d| d.code == codes::TYPEVERSION_EXCEEDS_MAX)
        .expect("diagnostic present");
    assert_eq!(
        diag.context.as_ref().and_then(|c| c.get("maximum")),
        Some(&json!("3"))
    );
}

#[test]
fn expression_missing_prefix_is_universal() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    fetch.parameters = json!({ "url": "{{ $json.endpoint }}" });
    let wf = workflow("expr", vec![fetch]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    let diag = report
        .issues
        .iter()
        .find(|d| d.code == codes::EXPRESSION_MISSING_PREFIX)
        .expect("missing-prefix diagnostic");
    assert_eq!(diag.severity, Severity::Error);
    assert_eq!(
        diag.location.as_ref().and_then(|l| l.path.as_deref()),
        Some("parameters.url")
    );
    assert_eq!(
        diag.context.as_ref().and_then(|c| c.get("confidence")),
        Some(&json!(1.0))
    );
}

#[test]
fn expression_unbalanced_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    fetch.parameters = json!({
        "url": "={{ $json.a }",
        "body": "={{ }}",
    });
    let wf = workflow("expr", vec![fetch]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    let codes = codes_of(&report);
    assert!(codes.contains(&codes::EXPRESSION_UNBALANCED));
    assert!(codes.contains(&codes::EXPRESSION_EMPTY));
}

#[test]
fn validator_soundness_missing_required_means_key_absent() {
    // For every NODE_MISSING_REQUIRED on node n, n must not have the key.
    let dir = tempfile::tempdir().unwrap();
    let path = common::build_catalog(dir.path(), true);
    {
        // Re-open writable to add a type with a required property.
        let mut b = n8n_cli::catalog::CatalogBuilder::create(&path, false).unwrap();
        b.insert(&n8n_cli::catalog::CatalogRow {
            node_type: "n8n-nodes-base.emailSend".into(),
            version: "1".into(),
            display_name: "Send Email".into(),
            category: "Communication".into(),
            package: "n8n-nodes-base".into(),
            output_classes: vec!["main".into()],
            output_arity: 1,
            required_properties: vec!["toEmail".into()],
            properties: json!([]),
            ..Default::default()
        })
        .unwrap();
    }
    let store = CatalogStore::open(&path).unwrap();

    let mut with_key = node("Mail", "n8n-nodes-base.emailSend", 1.0);
    with_key.parameters = json!({ "toEmail": "ops@example.com" });
    let without_key = node("Mail2", "n8n-nodes-base.emailSend", 1.0);
    let wf = workflow("sound", vec![with_key, without_key]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Structure);
    for diag in report
        .issues
        .iter()
        .filter(|d| d.code == codes::NODE_MISSING_REQUIRED)
    {
        let node_name = diag
            .location
            .as_ref()
            .and_then(|l| l.node_name.as_deref())
            .unwrap();
        let prop = diag
            .context
            .as_ref()
            .and_then(|c| c.get("property"))
            .and_then(Value::as_str)
            .unwrap();
        let target = wf.get_node(node_name).unwrap();
        assert!(
            target.parameters.get(prop).is_none(),
            "diagnostic reported a key that exists"
        );
    }
    assert!(report
        .issues
        .iter()
        .any(|d| d.code == codes::NODE_MISSING_REQUIRED
            && d.location.as_ref().and_then(|l| l.node_name.as_deref()) == Some("Mail2")));
}

#[test]
fn parameter_values_are_typed_against_the_schema() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    fetch.parameters = json!({
        "url": 12345,                   // schema says string
        "method": "FETCH",              // not a declared option
        "sendBody": true,               // fine
    });
    let wf = workflow("typing", vec![fetch]);

    let report = Validator::new(&store).validate(&wf, Profile::Runtime, Mode::Operation);
    let codes = codes_of(&report);
    assert!(codes.contains(&codes::PARAM_TYPE_MISMATCH));
    assert!(codes.contains(&codes::PARAM_OPTION_UNKNOWN));

    // Structure mode stops before value typing.
    let shallow = Validator::new(&store).validate(&wf, Profile::Runtime, Mode::Structure);
    assert!(!codes_of(&shallow).contains(&codes::PARAM_TYPE_MISMATCH));
}

#[test]
fn expression_values_are_exempt_from_type_checks() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    fetch.parameters = json!({
        "url": "https://example.com",
        "method": "={{ $json.verb }}",
    });
    let wf = workflow("exempt", vec![fetch]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    assert!(!codes_of(&report).contains(&codes::PARAM_OPTION_UNKNOWN));
}

#[test]
fn code_node_checks_fire_in_operation_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut code = node("Script", "n8n-nodes-base.code", 2.0);
    code.parameters = json!({
        "language": "python",
        "pythonCode": "import os\nprint('hi')",
    });
    let mut sql = node("Query", "n8n-nodes-base.postgres", 2.0);
    sql.parameters = json!({ "query": "SELECT * FROM users WHERE id = {{ $json.id }}" });
    let wf = workflow("codes", vec![code, sql]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    let codes = codes_of(&report);
    assert!(codes.contains(&codes::CODE_PYTHON_IMPORT_BLOCKED));
    assert!(codes.contains(&codes::SQL_TEMPLATE_INTERPOLATION));

    // Structure mode skips them.
    let shallow = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Structure);
    assert!(!codes_of(&shallow).contains(&codes::CODE_PYTHON_IMPORT_BLOCKED));
}

#[test]
fn ai_topology_checks_fire_in_full_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut agent = node("Agent", "@n8n/n8n-nodes-langchain.agent", 1.7);
    agent.parameters = json!({ "promptType": "define", "text": "" });
    let tool = node("Tool", "@n8n/n8n-nodes-langchain.toolHttpRequest", 1.0);
    let mut wf = workflow("ai", vec![agent, tool]);
    connect(&mut wf, "Tool", CLASS_AI_TOOL, 0, "Agent");

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Full);
    let codes = codes_of(&report);
    assert!(codes.contains(&codes::AI_AGENT_MISSING_LANGUAGE_MODEL));
    assert!(codes.contains(&codes::AI_EMPTY_PROMPT));
    assert!(codes.contains(&codes::AI_TOOL_MISSING_DESCRIPTION));

    // Wiring a model silences the first error.
    let model = node("Model", "@n8n/n8n-nodes-langchain.lmChatOpenAi", 1.0);
    wf.nodes.push(model);
    connect(&mut wf, "Model", CLASS_AI_LANGUAGE_MODEL, 0, "Agent");
    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Full);
    assert!(!codes_of(&report).contains(&codes::AI_AGENT_MISSING_LANGUAGE_MODEL));
}

#[test]
fn nested_values_collection_bug_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut set = node("Set", "n8n-nodes-base.set", 2.0);
    set.parameters = json!({
        "values": { "values": [ { "name": "a", "value": 1 } ] }
    });
    let wf = workflow("nested", vec![set]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    assert!(codes_of(&report).contains(&codes::NESTED_VALUES_COLLECTION));
}

#[test]
fn depth_cap_yields_a_bounded_warning_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    // 120 levels of nesting, well past the cap of 100.
    let mut params = json!({ "leaf": "{{ $json.x }}" });
    for _ in 0..120 {
        params = json!({ "wrap": params });
    }
    let mut deep = node("Deep", "n8n-nodes-base.set", 3.0);
    deep.parameters = params;
    let wf = workflow("deep", vec![deep]);

    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Operation);
    let depth_warnings = report
        .issues
        .iter()
        .filter(|d| d.code == codes::EXPRESSION_DEPTH_EXCEEDED)
        .count();
    assert_eq!(depth_warnings, 1, "exactly one bounded warning");
}

#[test]
fn profiles_filter_what_survives() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 2.0);
    fetch.parameters = json!({ "url": "{{ $json.endpoint }}" });
    let external = node("Custom", "custom-nodes.mystery", 1.0);
    let wf = workflow("profiles", vec![fetch, external]);

    let strict = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Full);
    let minimal = Validator::new(&store).validate(&wf, Profile::Minimal, Mode::Full);
    let runtime = Validator::new(&store).validate(&wf, Profile::Runtime, Mode::Full);

    // Strict keeps the external-type info; minimal and runtime drop it.
    assert!(codes_of(&strict).contains(&codes::EXTERNAL_NODE_TYPE));
    assert!(!codes_of(&minimal).contains(&codes::EXTERNAL_NODE_TYPE));
    assert!(!codes_of(&runtime).contains(&codes::EXTERNAL_NODE_TYPE));

    // The expression error is not in the minimal critical set, but every
    // error survives runtime.
    assert!(codes_of(&runtime).contains(&codes::EXPRESSION_MISSING_PREFIX));
    assert!(!codes_of(&minimal).contains(&codes::EXPRESSION_MISSING_PREFIX));

    // The outdated-version warning is runtime material.
    assert!(codes_of(&runtime).contains(&codes::TYPEVERSION_OUTDATED));
}

#[test]
fn error_output_policy_shapes_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut fetch = node("Fetch", "n8n-nodes-base.httpRequest", 3.0);
    fetch.on_error = Some(OnError::ContinueErrorOutput);
    fetch.parameters = json!({ "url": "https://example.com" });
    let wf = workflow("onerr", vec![fetch]);

    // The validator itself accepts the policy; the auto-fix engine owns
    // the unwired-error-output cleanup.
    let report = Validator::new(&store).validate(&wf, Profile::Strict, Mode::Full);
    assert!(!report
        .issues
        .iter()
        .any(|d| d.severity == Severity::Error && d.code == codes::INVALID_CONNECTION));
}
