// src/store.rs
//
// =============================================================================
// N8N-CLI: LOCAL STATE STORE
// =============================================================================
//
// The writable side of local state, owned by a single process:
// - `~/.n8n-cli/data.db`  : SQLite in WAL mode holding workflow-version
//   snapshot records (content-hashed, deduplicated when consecutive
//   snapshots are identical).
// - `~/.n8n-cli/backups/` : pre-mutation JSON dumps, owner-only.
//
// The directory and every file in it are restricted to the invoking user.
// Closing the store checkpoints the WAL.

use crate::errors::CliError;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub workflow_id: String,
    pub operation: String,
    pub content_sha256: String,
    pub taken_at_ms: i64,
    pub file: String,
}

pub struct LocalStore {
    root: PathBuf,
    conn: Connection,
}

impl LocalStore {
    /// Open (creating on demand) the local state directory and its
    /// database. A failed integrity check is fatal: the snapshot history
    /// is this tool's undo trail and silently proceeding on a corrupt one
    /// would be worse than stopping.
    pub fn open(root: impl AsRef<Path>) -> std::result::Result<Self, CliError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("backups"))?;
        restrict_dir(&root)?;
        restrict_dir(&root.join("backups"))?;

        let conn = Connection::open(root.join("data.db"))
            .map_err(|e| CliError::internal(format!("cannot open local store: {e}")))?;

        // WAL keeps TUI-less readers (e.g. a second invocation listing
        // history) from blocking the writer.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| CliError::internal(format!("local store pragmas failed: {e}")))?;

        let check: String = conn
            .query_row("PRAGMA quick_check", [], |r| r.get(0))
            .map_err(|e| CliError::internal(format!("local store integrity check failed: {e}")))?;
        if check != "ok" {
            return Err(CliError::internal(format!(
                "local store failed its integrity check: {check}"
            )));
        }

        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                content_sha256 TEXT NOT NULL,
                taken_at_ms INTEGER NOT NULL,
                file TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_workflow
                ON snapshots(workflow_id, taken_at_ms);
            COMMIT;",
        )
        .map_err(|e| CliError::internal(format!("local store schema init failed: {e}")))?;

        Ok(Self { root, conn })
    }

    // -------------------------------------------------------------------------
    // BACKUP (before mutation)
    // -------------------------------------------------------------------------

    /// Persist the workflow JSON before a mutating RPC. Returns the backup
    /// file path. When the content hash matches the workflow's previous
    /// snapshot, the existing file is reused instead of writing a twin.
    pub fn backup_workflow(
        &self,
        operation: &str,
        workflow_id: &str,
        json: &str,
    ) -> Result<PathBuf> {
        let hash = hex::encode(Sha256::digest(json.as_bytes()));

        if let Some(previous) = self.last_snapshot(workflow_id)? {
            if previous.content_sha256 == hash && self.root.join(&previous.file).exists() {
                log::debug!(
                    "workflow {workflow_id} unchanged since last snapshot; reusing {}",
                    previous.file
                );
                return Ok(self.root.join(previous.file));
            }
        }

        let now = Utc::now();
        let stamp = now.format("%Y%m%dT%H%M%S%6f");
        let file_rel = format!("backups/{operation}-{workflow_id}-{stamp}.json");
        let path = self.root.join(&file_rel);

        write_owner_only(&path, json)
            .with_context(|| format!("Failed to write backup {path:?}"))?;

        self.conn.execute(
            "INSERT INTO snapshots (workflow_id, operation, content_sha256, taken_at_ms, file)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                workflow_id,
                operation,
                hash,
                now.timestamp_millis(),
                file_rel
            ],
        )?;

        Ok(path)
    }

    pub fn last_snapshot(&self, workflow_id: &str) -> Result<Option<SnapshotInfo>> {
        let row = self
            .conn
            .query_row(
                "SELECT workflow_id, operation, content_sha256, taken_at_ms, file
                 FROM snapshots WHERE workflow_id = ?1
                 ORDER BY taken_at_ms DESC, id DESC LIMIT 1",
                params![workflow_id],
                |r| {
                    Ok(SnapshotInfo {
                        workflow_id: r.get(0)?,
                        operation: r.get(1)?,
                        content_sha256: r.get(2)?,
                        taken_at_ms: r.get(3)?,
                        file: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Snapshot history for one workflow, newest first.
    pub fn list_snapshots(&self, workflow_id: &str) -> Result<Vec<SnapshotInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT workflow_id, operation, content_sha256, taken_at_ms, file
             FROM snapshots WHERE workflow_id = ?1
             ORDER BY taken_at_ms DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![workflow_id], |r| {
                Ok(SnapshotInfo {
                    workflow_id: r.get(0)?,
                    operation: r.get(1)?,
                    content_sha256: r.get(2)?,
                    taken_at_ms: r.get(3)?,
                    file: r.get(4)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    /// Checkpoint the WAL and close. Called by the lifecycle teardown.
    pub fn close(self) {
        if let Err(e) = self
            .conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        {
            log::warn!("WAL checkpoint on close failed: {e}");
        }
    }
}

#[cfg(unix)]
fn restrict_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
