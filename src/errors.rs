// src/errors.rs
//
// =============================================================================
// N8N-CLI: ERROR TAXONOMY
// =============================================================================
//
// The stable error kinds every subsystem surfaces and the UI layer matches
// on. Each variant maps to a sysexits-aligned exit code.
//
// Rules:
// 1. Recoverable failures are values, never panics.
// 2. Anything carrying request/response context is sanitized before it is
//    allowed into this enum (see client::sanitize).
// 3. Cancellation propagates without wrapping.

use crate::validator::Diagnostic;
use thiserror::Error;

/// Exit codes, POSIX sysexits-aligned.
pub mod exit {
    pub const OK: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const DATA_ERR: i32 = 65;
    pub const NO_INPUT: i32 = 66;
    pub const UNAVAILABLE: i32 = 69;
    pub const SOFTWARE: i32 = 70;
    pub const NO_PERM: i32 = 73;
    pub const IO_ERR: i32 = 74;
    pub const TEMP_FAIL: i32 = 75;
    pub const PROTOCOL: i32 = 76;
    pub const CONFIG: i32 = 78;
    pub const SIGINT: i32 = 130;
    pub const SIGTERM: i32 = 143;
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// 429 from the server after retries were exhausted. Carries the wait
    /// the server asked for so the caller can display instructions.
    #[error("rate limited{}", retry_after_display(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error (status {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("transport error: {message}")]
    TransportError { message: String, retryable: bool },

    #[error("operation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("workflow validation failed ({} issue(s))", .diagnostics.len())]
    ValidationFailed { diagnostics: Vec<Diagnostic> },

    #[error("parse failed at line {line}, column {column}: {message}")]
    ParseFailed {
        line: usize,
        column: usize,
        message: String,
    },

    /// Diff pre-check rejected the operation batch.
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation inside this program. The only fatal kind.
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn retry_after_display(secs: &Option<u64>) -> String {
    match secs {
        Some(s) => format!(", retry after {s}s"),
        None => String::new(),
    }
}

impl CliError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Derive the process exit code from the error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::NotFound { .. } => exit::NO_INPUT,
            CliError::AuthFailed { .. } => exit::NO_PERM,
            CliError::RateLimited { .. } => exit::TEMP_FAIL,
            CliError::ServerError { .. } => exit::UNAVAILABLE,
            CliError::TransportError { .. } => exit::UNAVAILABLE,
            CliError::Timeout { .. } => exit::TEMP_FAIL,
            CliError::Cancelled => exit::SIGINT,
            CliError::ValidationFailed { .. } => exit::DATA_ERR,
            CliError::ParseFailed { .. } => exit::DATA_ERR,
            CliError::Conflict { .. } => exit::PROTOCOL,
            CliError::ConfigInvalid { .. } => exit::CONFIG,
            CliError::PermissionDenied { .. } => exit::NO_PERM,
            CliError::Io(_) => exit::IO_ERR,
            CliError::Internal { .. } => exit::SOFTWARE,
        }
    }

    /// A short hint the renderer may append. Sourced here so the message
    /// and the hint never drift apart.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::AuthFailed { .. } => {
                Some("check N8N_API_KEY or the apiKey entry in ~/.n8n-cli/config.json")
            }
            CliError::RateLimited { .. } => Some("wait and re-run, or reduce request frequency"),
            CliError::ConfigInvalid { .. } => Some("run with RUST_LOG=debug to see config sources"),
            CliError::ParseFailed { .. } => {
                Some("pass --relaxed to accept comments and trailing commas")
            }
            _ => None,
        }
    }

    /// Retryable under the client's retry policy. Only the client
    /// consults this.
    pub fn is_retryable(&self) -> bool {
        match self {
            CliError::ServerError { status, .. } => *status >= 500,
            CliError::RateLimited { .. } => true,
            CliError::TransportError { retryable, .. } => *retryable,
            CliError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
