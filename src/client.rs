// src/client.rs
//
// =============================================================================
// N8N-CLI: HTTP CLIENT
// =============================================================================
//
// Authenticated, retrying, sanitizing transport to the n8n REST API.
//
// Retry policy:
// - retryable: connect-class transport errors, timeouts, 5xx, 429
// - 4xx other than 429 never retry
// - exponential backoff with jitter, base 1s, cap 8s, max 3 attempts
// - a 429 with a parseable Retry-After waits max(1s, header) and does not
//   consume a backoff step
// - non-idempotent requests (POST/PATCH) only retry when the request
//   provably never reached the server (connect errors) or on 429
//
// Every surfaced error passes through sanitization first: secret headers
// and secret body keys are redacted, and the raw API key never appears in
// any message.

use crate::config::Config;
use crate::core::Workflow;
use crate::errors::CliError;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The credential header the server expects.
pub const API_KEY_HEADER: &str = "X-N8N-API-KEY";

/// Header names whose values are always redacted (case-insensitive).
const SECRET_HEADERS: &[&str] = &["x-n8n-api-key", "authorization", "cookie"];

/// Body keys whose values are always redacted (case-insensitive).
const SECRET_BODY_KEYS: &[&str] = &["apikey", "password", "secret", "token", "authorization"];

const REDACTED: &str = "[REDACTED]";

/// Recursive redaction stops at this depth; anything deeper was already
/// depth-capped by the parser.
const SANITIZE_MAX_DEPTH: usize = 16;

pub const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 8_000;

/// Per-operation default timeouts.
pub mod timeouts {
    use std::time::Duration;

    pub const HEALTH: Duration = Duration::from_secs(5);
    pub const LIST: Duration = Duration::from_secs(15);
    pub const GET: Duration = Duration::from_secs(30);
    pub const COMPLEX_GET: Duration = Duration::from_secs(60);
    pub const WEBHOOK: Duration = Duration::from_secs(30);
    pub const WEBHOOK_WAIT: Duration = Duration::from_secs(120);
}

// ============================================================================
// 1. VIEW MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// The server wraps list responses in a data envelope.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

// ============================================================================
// 2. THE API SURFACE
// ============================================================================

/// Per-operation methods against the remote server. A trait so commands
/// and tests can swap the transport.
#[async_trait]
pub trait N8nApi {
    async fn health(&self, ctx: &CancellationToken) -> Result<Value, CliError>;
    async fn list_workflows(&self, ctx: &CancellationToken)
        -> Result<Vec<WorkflowSummary>, CliError>;
    async fn get_workflow(&self, ctx: &CancellationToken, id: &str) -> Result<Workflow, CliError>;
    async fn create_workflow(
        &self,
        ctx: &CancellationToken,
        workflow: &Workflow,
    ) -> Result<Workflow, CliError>;
    /// PUT, falling back to PATCH when the server rejects the method.
    async fn update_workflow(
        &self,
        ctx: &CancellationToken,
        id: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, CliError>;
    async fn delete_workflow(&self, ctx: &CancellationToken, id: &str) -> Result<(), CliError>;
    async fn trigger_webhook(
        &self,
        ctx: &CancellationToken,
        url: &str,
        body: Option<Value>,
        wait: bool,
    ) -> Result<Value, CliError>;
    async fn list_executions(
        &self,
        ctx: &CancellationToken,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> Result<Value, CliError>;
    async fn get_execution(
        &self,
        ctx: &CancellationToken,
        id: &str,
        include_data: bool,
    ) -> Result<Value, CliError>;
    async fn delete_execution(&self, ctx: &CancellationToken, id: &str) -> Result<(), CliError>;
    async fn retry_execution(&self, ctx: &CancellationToken, id: &str) -> Result<Value, CliError>;
}

// ============================================================================
// 3. THE CLIENT
// ============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
    /// Caller override for every operation, from config.
    default_timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, CliError> {
        let base = config.require_host()?.to_string();
        let api_key = config.require_api_key()?.to_string();

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(30));
        if config.insecure_https {
            // Scoped to this client only; nothing else in the process
            // talks TLS.
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| CliError::internal(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            http,
            base,
            api_key,
            default_timeout: config.timeout_ms.map(Duration::from_millis),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base)
    }

    fn effective_timeout(&self, per_op: Duration) -> Duration {
        self.default_timeout.unwrap_or(per_op)
    }

    // ------------------------------------------------------------------------
    // Request core
    // ------------------------------------------------------------------------

    async fn request_value(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
        with_auth: bool,
        ctx: &CancellationToken,
    ) -> Result<Value, CliError> {
        let idempotent = matches!(method.as_str(), "GET" | "PUT" | "DELETE" | "HEAD");
        let mut backoff_step = 0u32;
        let mut attempt = 0u32;
        let mut last_err: Option<CliError> = None;

        while attempt < MAX_ATTEMPTS {
            attempt += 1;

            let mut req = self
                .http
                .request(method.clone(), url)
                .timeout(timeout)
                .header("Accept", "application/json");
            if with_auth {
                req = req.header(API_KEY_HEADER, &self.api_key);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let sent = tokio::select! {
                _ = ctx.cancelled() => return Err(CliError::Cancelled),
                result = req.send() => result,
            };

            let err = match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return self.read_success(response).await;
                    }
                    self.classify_status(response).await
                }
                Err(e) => classify_transport(e, timeout),
            };

            let attempts_left = attempt < MAX_ATTEMPTS;
            if let CliError::RateLimited { retry_after_secs } = &err {
                if attempts_left {
                    // Honoring Retry-After does not consume a backoff step.
                    let wait = Duration::from_secs(retry_after_secs.unwrap_or(0).max(1));
                    log::debug!("rate limited; waiting {}s before retry", wait.as_secs());
                    if !sleep_cancellable(wait, ctx).await {
                        return Err(CliError::Cancelled);
                    }
                    last_err = Some(err);
                    continue;
                }
            } else if attempts_left && err.is_retryable() && (idempotent || never_reached(&err)) {
                let wait = backoff_with_jitter(backoff_step);
                backoff_step += 1;
                log::debug!(
                    "attempt {attempt} failed ({err}); backing off {}ms",
                    wait.as_millis()
                );
                if !sleep_cancellable(wait, ctx).await {
                    return Err(CliError::Cancelled);
                }
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err.unwrap_or_else(|| CliError::internal("retry loop exited without an error")))
    }

    async fn read_success(&self, response: reqwest::Response) -> Result<Value, CliError> {
        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| CliError::ServerError {
            status: 200,
            message: format!("unparseable response body: {e}"),
        })
    }

    /// Map a non-success response to the error taxonomy, sanitized.
    async fn classify_status(&self, response: reqwest::Response) -> CliError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let message = self.sanitize_body_text(&body);

        match status {
            StatusCode::TOO_MANY_REQUESTS => CliError::RateLimited {
                retry_after_secs: retry_after,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CliError::AuthFailed { message },
            StatusCode::NOT_FOUND => CliError::NotFound { what: message },
            _ => CliError::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Best-effort sanitization of a response body before it can enter an
    /// error message: JSON bodies get key-level redaction, everything gets
    /// the raw API key scrubbed, and long bodies are truncated.
    fn sanitize_body_text(&self, body: &str) -> String {
        let mut text = match serde_json::from_str::<Value>(body) {
            Ok(mut v) => {
                sanitize_value(&mut v);
                v.to_string()
            }
            Err(_) => body.to_string(),
        };
        if !self.api_key.is_empty() {
            text = text.replace(&self.api_key, REDACTED);
        }
        if text.len() > 500 {
            text.truncate(500);
            text.push_str("...");
        }
        if text.trim().is_empty() {
            text = "(empty body)".to_string();
        }
        text
    }
}

/// Transport failures the request provably never reached the server for;
/// safe to retry even for non-idempotent methods.
fn never_reached(err: &CliError) -> bool {
    matches!(
        err,
        CliError::TransportError {
            retryable: true,
            ..
        }
    )
}

fn classify_transport(err: reqwest::Error, timeout: Duration) -> CliError {
    if err.is_timeout() {
        return CliError::Timeout {
            after_ms: timeout.as_millis() as u64,
        };
    }
    // Connect-class failures (refused, unreachable, DNS) surface as
    // is_connect; request bodies were never transmitted.
    let retryable = err.is_connect();
    CliError::TransportError {
        message: scrub_error_text(&err.to_string()),
        retryable,
    }
}

/// reqwest error strings embed the URL; strip userinfo-style credentials
/// if a caller ever passed them in a webhook URL.
fn scrub_error_text(text: &str) -> String {
    match text.split_once('@') {
        Some((head, tail)) if head.contains("://") => {
            let scheme_end = head.find("://").map(|i| i + 3).unwrap_or(0);
            format!("{}{}@{}", &head[..scheme_end], REDACTED, tail)
        }
        _ => text.to_string(),
    }
}

fn backoff_with_jitter(step: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << step.min(3));
    let capped = base.min(BACKOFF_CAP_MS);
    // +-25% jitter keeps a burst of clients from re-synchronizing.
    let jitter = rand::thread_rng().gen_range(0.75..1.25);
    Duration::from_millis((capped as f64 * jitter) as u64)
}

/// Sleep or bail when the root context cancels. Returns false on cancel.
async fn sleep_cancellable(duration: Duration, ctx: &CancellationToken) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

// ============================================================================
// 4. SANITIZATION
// ============================================================================

/// Redact secret keys in place, recursively, bounded by depth. Idempotent:
/// re-sanitizing replaces the redaction marker with itself.
pub fn sanitize_value(value: &mut Value) {
    sanitize_at_depth(value, 0);
}

fn sanitize_at_depth(value: &mut Value, depth: usize) {
    if depth > SANITIZE_MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let lowered = key.to_lowercase();
                if SECRET_BODY_KEYS.contains(&lowered.as_str())
                    || SECRET_HEADERS.contains(&lowered.as_str())
                {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    sanitize_at_depth(child, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                sanitize_at_depth(child, depth + 1);
            }
        }
        _ => {}
    }
}

/// Redact secret header entries of a (name, value) list in place.
pub fn sanitize_headers(headers: &mut [(String, String)]) {
    for (name, value) in headers.iter_mut() {
        if SECRET_HEADERS.contains(&name.to_lowercase().as_str()) {
            *value = REDACTED.to_string();
        }
    }
}

// ============================================================================
// 5. OPERATIONS
// ============================================================================

#[async_trait]
impl N8nApi for ApiClient {
    async fn health(&self, ctx: &CancellationToken) -> Result<Value, CliError> {
        // The healthz endpoint lives outside the versioned prefix and
        // requires no credential.
        let url = format!("{}/healthz", self.base);
        self.request_value(
            Method::GET,
            &url,
            None,
            self.effective_timeout(timeouts::HEALTH),
            false,
            ctx,
        )
        .await
    }

    async fn list_workflows(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Vec<WorkflowSummary>, CliError> {
        let value = self
            .request_value(
                Method::GET,
                &self.api_url("/workflows"),
                None,
                self.effective_timeout(timeouts::LIST),
                true,
                ctx,
            )
            .await?;
        // Either a bare array or the { "data": [...] } envelope.
        if value.is_array() {
            return serde_json::from_value(value).map_err(|e| CliError::ServerError {
                status: 200,
                message: format!("unexpected list shape: {e}"),
            });
        }
        serde_json::from_value::<ListEnvelope<WorkflowSummary>>(value)
            .map(|env| env.data)
            .map_err(|e| CliError::ServerError {
                status: 200,
                message: format!("unexpected list shape: {e}"),
            })
    }

    async fn get_workflow(&self, ctx: &CancellationToken, id: &str) -> Result<Workflow, CliError> {
        let value = self
            .request_value(
                Method::GET,
                &self.api_url(&format!("/workflows/{id}")),
                None,
                self.effective_timeout(timeouts::GET),
                true,
                ctx,
            )
            .await?;
        parse_payload(value)
    }

    async fn create_workflow(
        &self,
        ctx: &CancellationToken,
        workflow: &Workflow,
    ) -> Result<Workflow, CliError> {
        let body = serde_json::to_value(workflow)
            .map_err(|e| CliError::internal(format!("workflow projection failed: {e}")))?;
        let value = self
            .request_value(
                Method::POST,
                &self.api_url("/workflows"),
                Some(&body),
                self.effective_timeout(timeouts::GET),
                true,
                ctx,
            )
            .await?;
        parse_payload(value)
    }

    async fn update_workflow(
        &self,
        ctx: &CancellationToken,
        id: &str,
        workflow: &Workflow,
    ) -> Result<Workflow, CliError> {
        let body = serde_json::to_value(workflow)
            .map_err(|e| CliError::internal(format!("workflow projection failed: {e}")))?;
        let url = self.api_url(&format!("/workflows/{id}"));
        let timeout = self.effective_timeout(timeouts::GET);

        let put = self
            .request_value(Method::PUT, &url, Some(&body), timeout, true, ctx)
            .await;
        match put {
            Err(CliError::ServerError { status: 405, .. }) => {
                log::debug!("server rejected PUT for {url}; retrying as PATCH");
                let value = self
                    .request_value(Method::PATCH, &url, Some(&body), timeout, true, ctx)
                    .await?;
                parse_payload(value)
            }
            Ok(value) => parse_payload(value),
            Err(e) => Err(e),
        }
    }

    async fn delete_workflow(&self, ctx: &CancellationToken, id: &str) -> Result<(), CliError> {
        self.request_value(
            Method::DELETE,
            &self.api_url(&format!("/workflows/{id}")),
            None,
            self.effective_timeout(timeouts::GET),
            true,
            ctx,
        )
        .await
        .map(|_| ())
    }

    async fn trigger_webhook(
        &self,
        ctx: &CancellationToken,
        url: &str,
        body: Option<Value>,
        wait: bool,
    ) -> Result<Value, CliError> {
        let timeout = self.effective_timeout(if wait {
            timeouts::WEBHOOK_WAIT
        } else {
            timeouts::WEBHOOK
        });
        // Webhook URLs are user-published and may point anywhere; never
        // attach the API credential to them.
        self.request_value(Method::POST, url, body.as_ref(), timeout, false, ctx)
            .await
    }

    async fn list_executions(
        &self,
        ctx: &CancellationToken,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> Result<Value, CliError> {
        let mut url = format!("{}?limit={limit}", self.api_url("/executions"));
        if let Some(id) = workflow_id {
            url.push_str(&format!("&workflowId={id}"));
        }
        self.request_value(
            Method::GET,
            &url,
            None,
            self.effective_timeout(timeouts::LIST),
            true,
            ctx,
        )
        .await
    }

    async fn get_execution(
        &self,
        ctx: &CancellationToken,
        id: &str,
        include_data: bool,
    ) -> Result<Value, CliError> {
        let url = format!(
            "{}?includeData={include_data}",
            self.api_url(&format!("/executions/{id}"))
        );
        let timeout = if include_data {
            timeouts::COMPLEX_GET
        } else {
            timeouts::GET
        };
        self.request_value(
            Method::GET,
            &url,
            None,
            self.effective_timeout(timeout),
            true,
            ctx,
        )
        .await
    }

    async fn delete_execution(&self, ctx: &CancellationToken, id: &str) -> Result<(), CliError> {
        self.request_value(
            Method::DELETE,
            &self.api_url(&format!("/executions/{id}")),
            None,
            self.effective_timeout(timeouts::GET),
            true,
            ctx,
        )
        .await
        .map(|_| ())
    }

    async fn retry_execution(&self, ctx: &CancellationToken, id: &str) -> Result<Value, CliError> {
        self.request_value(
            Method::POST,
            &self.api_url(&format!("/executions/{id}/retry")),
            None,
            self.effective_timeout(timeouts::GET),
            true,
            ctx,
        )
        .await
    }
}

/// Servers wrap some payloads in { "data": ... }; accept both shapes.
fn parse_payload<T: DeserializeOwned>(value: Value) -> Result<T, CliError> {
    let unwrapped = match &value {
        Value::Object(map) if map.len() <= 2 && map.contains_key("data") => {
            map.get("data").cloned().unwrap_or(value.clone())
        }
        _ => value,
    };
    serde_json::from_value(unwrapped).map_err(|e| CliError::ServerError {
        status: 200,
        message: format!("unexpected response shape: {e}"),
    })
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base)
            .field("api_key", &REDACTED)
            .finish()
    }
}
