// tests/http_client.rs
//
// Retry policy, Retry-After honor, idempotency rules and sanitization,
// verified against a local mock server.

use n8n_cli::client::{sanitize_headers, sanitize_value, ApiClient, N8nApi};
use n8n_cli::config::Config;
use n8n_cli::core::Workflow;
use n8n_cli::errors::CliError;
use serde_json::json;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TEST_KEY: &str = "test-api-key-123456";

fn client_for(server: &MockServer) -> ApiClient {
    let config = Config {
        host: Some(server.uri()),
        api_key: Some(TEST_KEY.to_string()),
        ..Config::default()
    };
    ApiClient::new(&config).unwrap()
}

fn sample_workflow_body() -> serde_json::Value {
    json!({
        "id": "wf1",
        "name": "sample",
        "nodes": [],
        "connections": {},
        "settings": {}
    })
}

/// Responds 429 (with Retry-After) a fixed number of times, then 200.
struct RateLimitThenOk {
    failures: std::sync::atomic::AtomicUsize,
    retry_after: &'static str,
}

impl Respond for RateLimitThenOk {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        use std::sync::atomic::Ordering;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            ResponseTemplate::new(429).insert_header("Retry-After", self.retry_after)
        } else {
            ResponseTemplate::new(200).set_body_json(json!({
                "data": sample_workflow_body()
            }))
        }
    }
}

#[tokio::test]
async fn rate_limit_is_honored_then_succeeds() {
    // 429 with Retry-After: 2, then 200. Expect one wait of
    // at least 2s and exactly two attempts.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/wf1"))
        .respond_with(RateLimitThenOk {
            failures: std::sync::atomic::AtomicUsize::new(1),
            retry_after: "2",
        })
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let started = Instant::now();
    let workflow: Workflow = client
        .get_workflow(&CancellationToken::new(), "wf1")
        .await
        .expect("second attempt succeeds");
    assert!(started.elapsed().as_secs_f64() >= 2.0, "waited Retry-After");
    assert_eq!(workflow.name, "sample");
}

#[tokio::test]
async fn retries_are_bounded_at_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.get_workflow(&CancellationToken::new(), "down").await;
    match result {
        Err(CliError::ServerError { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_idempotent_posts_do_not_retry_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let wf: Workflow = serde_json::from_value(sample_workflow_body()).unwrap();
    let result = client.create_workflow(&CancellationToken::new(), &wf).await;
    assert!(matches!(result, Err(CliError::ServerError { status: 500, .. })));
}

#[tokio::test]
async fn four_xx_other_than_429_never_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such workflow"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .get_workflow(&CancellationToken::new(), "missing")
        .await;
    assert!(matches!(result, Err(CliError::NotFound { .. })));
}

#[tokio::test]
async fn auth_failures_map_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "unauthorized"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client.list_workflows(&CancellationToken::new()).await;
    assert!(matches!(result, Err(CliError::AuthFailed { .. })));
}

#[tokio::test]
async fn api_key_header_is_sent_and_health_needs_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows"))
        .and(header("X-N8N-API-KEY", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();
    let listed = client.list_workflows(&token).await.unwrap();
    assert!(listed.is_empty());
    let health = client.health(&token).await.unwrap();
    assert_eq!(health["status"], json!("ok"));
}

#[tokio::test]
async fn surfaced_errors_never_contain_the_api_key() {
    // Sanitization closure: even when the server echoes secrets back, the
    // surfaced error text redacts them.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/echo"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "upstream rejected the call",
            "apiKey": TEST_KEY,
            "request": { "headers": { "authorization": "Bearer something-secret" } }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .get_workflow(&CancellationToken::new(), "echo")
        .await
        .unwrap_err();
    let rendered = format!("{err}");
    assert!(!rendered.contains(TEST_KEY), "leaked key: {rendered}");
    assert!(!rendered.contains("something-secret"), "leaked header: {rendered}");
    assert!(rendered.contains("[REDACTED]"));
}

#[tokio::test]
async fn cancellation_aborts_inflight_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/workflows/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": sample_workflow_body() }))
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let result = client.get_workflow(&token, "slow").await;
    assert!(matches!(result, Err(CliError::Cancelled)));
    assert!(started.elapsed().as_secs() < 5, "returned promptly");
}

#[tokio::test]
async fn put_falls_back_to_patch_on_405() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/workflows/wf1"))
        .respond_with(ResponseTemplate::new(405).set_body_string("PUT not allowed"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/workflows/wf1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": sample_workflow_body()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let wf: Workflow = serde_json::from_value(sample_workflow_body()).unwrap();
    let updated = client
        .update_workflow(&CancellationToken::new(), "wf1", &wf)
        .await
        .unwrap();
    assert_eq!(updated.name, "sample");
}

// -----------------------------------------------------------------------------
// Pure sanitization checks
// -----------------------------------------------------------------------------

#[test]
fn sanitize_value_redacts_secret_keys_recursively() {
    let mut body = json!({
        "name": "fine",
        "apiKey": "secret-1",
        "nested": {
            "Password": "secret-2",
            "deeper": [ { "TOKEN": "secret-3" } ]
        }
    });
    sanitize_value(&mut body);
    assert_eq!(body["apiKey"], json!("[REDACTED]"));
    assert_eq!(body["nested"]["Password"], json!("[REDACTED]"));
    assert_eq!(body["nested"]["deeper"][0]["TOKEN"], json!("[REDACTED]"));
    assert_eq!(body["name"], json!("fine"));
}

#[test]
fn sanitize_value_is_idempotent() {
    let mut once = json!({ "authorization": "Bearer abc", "ok": 1 });
    sanitize_value(&mut once);
    let mut twice = once.clone();
    sanitize_value(&mut twice);
    assert_eq!(once, twice);
}

#[test]
fn sanitize_headers_redacts_the_secret_set_case_insensitively() {
    let mut headers = vec![
        ("X-N8N-API-KEY".to_string(), "k".to_string()),
        ("Authorization".to_string(), "Bearer t".to_string()),
        ("Cookie".to_string(), "session=1".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ];
    sanitize_headers(&mut headers);
    assert_eq!(headers[0].1, "[REDACTED]");
    assert_eq!(headers[1].1, "[REDACTED]");
    assert_eq!(headers[2].1, "[REDACTED]");
    assert_eq!(headers[3].1, "application/json");
}
