// src/config.rs
//
// =============================================================================
// N8N-CLI: CONFIGURATION
// =============================================================================
//
// Precedence, highest first: environment, config file. The config file is
// ~/.n8n-cli/config.json; its permissions are audited on load. Under
// strict mode a group/world-readable file refuses to load.

use crate::errors::CliError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_HOST: &str = "N8N_HOST";
pub const ENV_API_KEY: &str = "N8N_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "N8N_TIMEOUT_MS";
pub const ENV_DB_PATH: &str = "N8N_CLI_DB_PATH";
pub const ENV_INSECURE_HTTPS: &str = "N8N_INSECURE_HTTPS";
pub const ENV_CLEANUP_TIMEOUT_MS: &str = "N8N_CLI_CLEANUP_TIMEOUT_MS";
pub const ENV_STRICT_PERMISSIONS: &str = "N8N_CLI_STRICT_PERMISSIONS";

pub const DEFAULT_CLEANUP_TIMEOUT_MS: u64 = 5_000;

/// The persisted file shape (camelCase keys, all optional).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    host: Option<String>,
    api_key: Option<String>,
    /// Default per-operation timeout in ms.
    timeout: Option<u64>,
    insecure_https: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub db_path: Option<PathBuf>,
    pub insecure_https: bool,
    pub cleanup_timeout_ms: u64,
    pub strict_permissions: bool,
}

impl Config {
    /// Load env over file. Never errors on a missing file; errors on an
    /// unreadable/underprotected one (strict) or malformed values.
    pub fn load() -> Result<Self, CliError> {
        let strict = env_flag(ENV_STRICT_PERMISSIONS);
        let file = load_file(&config_file_path(), strict)?.unwrap_or_default();

        let mut cfg = Config {
            host: std::env::var(ENV_HOST).ok().or(file.host),
            api_key: std::env::var(ENV_API_KEY).ok().or(file.api_key),
            timeout_ms: parse_env_u64(ENV_TIMEOUT_MS)?.or(file.timeout),
            db_path: std::env::var(ENV_DB_PATH).ok().map(PathBuf::from),
            insecure_https: env_flag(ENV_INSECURE_HTTPS) || file.insecure_https.unwrap_or(false),
            cleanup_timeout_ms: parse_env_u64(ENV_CLEANUP_TIMEOUT_MS)?
                .unwrap_or(DEFAULT_CLEANUP_TIMEOUT_MS),
            strict_permissions: strict,
        };

        if let Some(host) = &cfg.host {
            cfg.host = Some(host.trim_end_matches('/').to_string());
        }
        Ok(cfg)
    }

    pub fn require_host(&self) -> Result<&str, CliError> {
        self.host.as_deref().ok_or_else(|| CliError::ConfigInvalid {
            message: format!("no host configured; set {ENV_HOST} or add host to the config file"),
        })
    }

    pub fn require_api_key(&self) -> Result<&str, CliError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CliError::ConfigInvalid {
                message: format!(
                    "no API key configured; set {ENV_API_KEY} or add apiKey to the config file"
                ),
            })
    }

    /// The bundled catalog path: env override, else next to the binary.
    pub fn catalog_path(&self) -> PathBuf {
        if let Some(p) = &self.db_path {
            return p.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|d| d.join("nodes.db")))
            .unwrap_or_else(|| PathBuf::from("nodes.db"))
    }
}

/// `~/.n8n-cli/` (created on demand by the store, not here).
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".n8n-cli")
}

fn config_file_path() -> PathBuf {
    state_dir().join("config.json")
}

fn load_file(path: &Path, strict: bool) -> Result<Option<ConfigFile>, CliError> {
    if !path.exists() {
        return Ok(None);
    }

    audit_permissions(path, strict)?;

    let raw = std::fs::read_to_string(path)?;
    let parsed: ConfigFile =
        serde_json::from_str(&raw).map_err(|e| CliError::ConfigInvalid {
            message: format!("{}: {e}", path.display()),
        })?;
    Ok(Some(parsed))
}

/// Group/world access to the config file leaks the API key. Warn by
/// default; refuse under strict mode.
#[cfg(unix)]
fn audit_permissions(path: &Path, strict: bool) -> Result<(), CliError> {
    use std::os::unix::fs::MetadataExt;
    let mode = std::fs::metadata(path)?.mode();
    if mode & 0o077 != 0 {
        if strict {
            return Err(CliError::PermissionDenied {
                message: format!(
                    "{} is readable by group/others (mode {:03o}); chmod 600 it or unset {ENV_STRICT_PERMISSIONS}",
                    path.display(),
                    mode & 0o777
                ),
            });
        }
        log::warn!(
            "{} is readable by group/others (mode {:03o}); consider chmod 600",
            path.display(),
            mode & 0o777
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn audit_permissions(_path: &Path, _strict: bool) -> Result<(), CliError> {
    // No POSIX mode bits to audit on this platform.
    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn parse_env_u64(name: &str) -> Result<Option<u64>, CliError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            CliError::ConfigInvalid {
                message: format!("{name}={raw} is not a non-negative integer"),
            }
        }),
    }
}
