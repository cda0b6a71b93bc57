// src/catalog.rs
//
// =============================================================================
// N8N-CLI: NODE CATALOG STORE
// =============================================================================
//
// Read-only query surface over the bundled node-type catalog (~800 types).
//
// Architecture:
// - SQLite, one row per node-type x version; heavy schema data is JSON text.
// - Optional FTS5 table `nodes_fts` with BM25 ranking; silently degrades
//   to LIKE matching when the table is absent or a query trips FTS syntax.
// - All user input is tokenized and quoted before it can reach FTS.
// - Opened read-only at runtime; safe for concurrent readers.

pub mod fuzzy;

use crate::errors::CliError;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// FTS5 meta characters that must never reach the index as syntax.
const FTS_META: &[char] = &[
    '"', '(', ')', '{', '}', '[', ']', '*', '+', '-', ':', '^', '~',
];

// -----------------------------------------------------------------------------
// View Models
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub node_type: String,
    pub display_name: String,
    pub category: String,
    pub package: String,
    pub description: String,
    pub is_ai_tool: bool,
    pub is_trigger: bool,
    pub is_webhook: bool,
    /// Known versions, ascending.
    pub versions: Vec<String>,
    /// Declared output classes of the latest version.
    pub output_classes: Vec<String>,
    /// Declared output arity (branch count) of the latest version.
    pub output_arity: u32,
    /// Variadic nodes (e.g. switch) grow outputs from parameters; branch
    /// bounds checks exempt them.
    pub variadic_outputs: bool,
    pub required_properties: Vec<String>,
}

impl CatalogRecord {
    pub fn latest_version(&self) -> &str {
        self.versions.last().map(String::as_str).unwrap_or("1")
    }

    pub fn short_name(&self) -> &str {
        self.node_type.rsplit('.').next().unwrap_or(&self.node_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    Or,
    And,
    Fuzzy,
}

/// How a search was actually answered. Degraded modes are surfaced so
/// callers (and tests) can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMethod {
    Fts,
    LikeFallback,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node_type: String,
    pub display_name: String,
    pub description: String,
    /// Present for fuzzy searches (0..100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub method: SearchMethod,
}

/// A near-miss suggestion for an unknown node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSuggestion {
    pub node_type: String,
    /// Normalized 0..1.
    pub score: f64,
}

/// One property of a node version, projected from the recursive schema to
/// the fields value-level validation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    /// "string" | "number" | "boolean" | "options" | "collection" | ...
    pub kind: String,
    /// Legal values when kind is "options".
    pub options: Vec<String>,
    pub required: bool,
}

// -----------------------------------------------------------------------------
// Version ordering
// -----------------------------------------------------------------------------

/// Strict numeric component-wise comparison of version literals
/// ("1" < "1.1" < "2" < "3.2" < "3.10"). Non-numeric components compare
/// as 0 rather than erroring; catalog content is trusted.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let pa: Vec<u64> = a.split('.').map(|c| c.parse().unwrap_or(0)).collect();
    let pb: Vec<u64> = b.split('.').map(|c| c.parse().unwrap_or(0)).collect();
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let ca = pa.get(i).copied().unwrap_or(0);
        let cb = pb.get(i).copied().unwrap_or(0);
        match ca.cmp(&cb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

// -----------------------------------------------------------------------------
// CatalogStore
// -----------------------------------------------------------------------------

pub struct CatalogStore {
    path: PathBuf,
    has_fts: bool,
}

impl CatalogStore {
    /// Open the catalog read-only and verify its schema.
    ///
    /// A catalog missing the `nodes` table is an invariant violation (the
    /// binary shipped without its data) and is fatal per the error design.
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, CliError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CliError::internal(format!("cannot open catalog {path:?}: {e}")))?;

        let has_nodes = table_exists(&conn, "nodes")
            .map_err(|e| CliError::internal(format!("catalog schema probe failed: {e}")))?;
        let has_fts = table_exists(&conn, "nodes_fts").unwrap_or(false);

        if !has_nodes && !has_fts {
            return Err(CliError::internal(format!(
                "catalog {path:?} has neither a nodes table nor an FTS view"
            )));
        }
        if !has_fts {
            log::debug!("catalog has no nodes_fts table; searches use LIKE fallback");
        }

        Ok(Self { path, has_fts })
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog DB")
    }

    // -------------------------------------------------------------------------
    // LOOKUP
    // -------------------------------------------------------------------------

    /// Resolve a possibly short/DB-form type to a catalog record.
    pub fn lookup_by_type(&self, node_type: &str) -> Result<Option<CatalogRecord>> {
        match self.normalize_type(node_type)? {
            Some(full) => self.fetch_record(&full),
            None => Ok(None),
        }
    }

    /// Resolve user-supplied type spellings to the canonical full type:
    /// 1. exact full-type match
    /// 2. DB-form expansion ("nodes-base.x" -> "n8n-nodes-base.x",
    ///    "nodes-langchain.x" -> "@n8n/n8n-nodes-langchain.x")
    /// 3. case-insensitive short-name lookup, preferring non-trigger
    ///    variants unless the caller spelled a trigger form
    /// 4. failure
    pub fn normalize_type(&self, input: &str) -> Result<Option<String>> {
        let conn = self.conn()?;

        if self.type_exists(&conn, input)? {
            return Ok(Some(input.to_string()));
        }

        if let Some(rest) = input.strip_prefix("nodes-base.") {
            let full = format!("n8n-nodes-base.{rest}");
            if self.type_exists(&conn, &full)? {
                return Ok(Some(full));
            }
        }
        if let Some(rest) = input.strip_prefix("nodes-langchain.") {
            let full = format!("@n8n/n8n-nodes-langchain.{rest}");
            if self.type_exists(&conn, &full)? {
                return Ok(Some(full));
            }
        }

        // Short-name lookup. Suffix-anchored after a dot, case-insensitive.
        let mut stmt = conn.prepare(
            "SELECT DISTINCT node_type, is_trigger FROM nodes
             WHERE lower(node_type) LIKE '%.' || lower(?1)
             ORDER BY node_type",
        )?;
        let rows: Vec<(String, bool)> = stmt
            .query_map(params![input], |r| Ok((r.get(0)?, r.get::<_, i64>(1)? != 0)))?
            .collect::<std::result::Result<_, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let wants_trigger = input.to_lowercase().ends_with("trigger");
        let chosen = rows
            .iter()
            .find(|(_, is_trigger)| *is_trigger == wants_trigger)
            .or_else(|| rows.first());
        Ok(chosen.map(|(t, _)| t.clone()))
    }

    fn type_exists(&self, conn: &Connection, node_type: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nodes WHERE node_type = ?1 LIMIT 1",
                params![node_type],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Assemble a record from all version rows of an exact type.
    fn fetch_record(&self, node_type: &str) -> Result<Option<CatalogRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT version, display_name, category, package, description,
                    is_ai_tool, is_trigger, is_webhook,
                    output_classes, output_arity, variadic_outputs,
                    required_properties
             FROM nodes WHERE node_type = ?1",
        )?;

        struct Row {
            version: String,
            display_name: String,
            category: String,
            package: String,
            description: String,
            is_ai_tool: bool,
            is_trigger: bool,
            is_webhook: bool,
            output_classes: String,
            output_arity: u32,
            variadic_outputs: bool,
            required_properties: String,
        }

        let mut rows: Vec<Row> = stmt
            .query_map(params![node_type], |r| {
                Ok(Row {
                    version: r.get(0)?,
                    display_name: r.get(1)?,
                    category: r.get(2)?,
                    package: r.get(3)?,
                    description: r.get(4)?,
                    is_ai_tool: r.get::<_, i64>(5)? != 0,
                    is_trigger: r.get::<_, i64>(6)? != 0,
                    is_webhook: r.get::<_, i64>(7)? != 0,
                    output_classes: r.get(8)?,
                    output_arity: r.get(9)?,
                    variadic_outputs: r.get::<_, i64>(10)? != 0,
                    required_properties: r.get(11)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.sort_by(|a, b| compare_versions(&a.version, &b.version));
        let versions: Vec<String> = rows.iter().map(|r| r.version.clone()).collect();
        let Some(latest) = rows.last() else {
            return Ok(None);
        };

        Ok(Some(CatalogRecord {
            node_type: node_type.to_string(),
            display_name: latest.display_name.clone(),
            category: latest.category.clone(),
            package: latest.package.clone(),
            description: latest.description.clone(),
            is_ai_tool: latest.is_ai_tool,
            is_trigger: latest.is_trigger,
            is_webhook: latest.is_webhook,
            versions,
            output_classes: serde_json::from_str(&latest.output_classes).unwrap_or_default(),
            output_arity: latest.output_arity,
            variadic_outputs: latest.variadic_outputs,
            required_properties: serde_json::from_str(&latest.required_properties)
                .unwrap_or_default(),
        }))
    }

    pub fn list_by_category(&self, category: &str) -> Result<Vec<CatalogRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT node_type FROM nodes WHERE category = ?1 ORDER BY node_type",
        )?;
        let types: Vec<String> = stmt
            .query_map(params![category], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        let mut out = Vec::with_capacity(types.len());
        for t in types {
            if let Some(rec) = self.fetch_record(&t)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Ordered (ascending) version list for an exact full type.
    pub fn versions(&self, node_type: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT version FROM nodes WHERE node_type = ?1")?;
        let mut versions: Vec<String> = stmt
            .query_map(params![node_type], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// The recursive property schema of an exact (type, version) row.
    pub fn property_schema(&self, node_type: &str, version: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT properties FROM nodes WHERE node_type = ?1 AND version = ?2",
                params![node_type, version],
                |r| r.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// The flat property list of a (type, version), for value-level
    /// validation. Falls back to the latest version's row when the exact
    /// version has no schema. Schema rows that don't parse are skipped,
    /// never fatal.
    pub fn property_specs(&self, node_type: &str, version: &str) -> Result<Vec<PropertySpec>> {
        let mut schema = self.property_schema(node_type, version)?;
        if schema.as_ref().map(|s| is_empty_schema(s)).unwrap_or(true) {
            let versions = self.versions(node_type)?;
            if let Some(latest) = versions.last() {
                if latest != version {
                    schema = self.property_schema(node_type, latest)?;
                }
            }
        }
        let Some(Value::Array(entries)) = schema else {
            return Ok(Vec::new());
        };

        let mut specs = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(name) = entry.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let kind = entry
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("string");
            let options = entry
                .get("options")
                .and_then(|v| v.as_array())
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| o.get("value").and_then(|v| v.as_str()))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            specs.push(PropertySpec {
                name: name.to_string(),
                kind: kind.to_string(),
                options,
                required: entry
                    .get("required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
        }
        Ok(specs)
    }

    // -------------------------------------------------------------------------
    // SEARCH
    // -------------------------------------------------------------------------

    pub fn search(&self, query: &str, mode: SearchMode, limit: usize) -> Result<SearchOutcome> {
        if mode == SearchMode::Fuzzy {
            return self.search_fuzzy(query, limit);
        }

        if self.has_fts {
            if let Some(fts_query) = sanitize_fts_query(query, mode) {
                match self.search_fts(&fts_query, limit) {
                    Ok(hits) => {
                        return Ok(SearchOutcome {
                            hits,
                            method: SearchMethod::Fts,
                        })
                    }
                    Err(e) => {
                        // FTS syntax failures degrade, they never surface.
                        log::debug!("FTS query failed ({e}); falling back to LIKE");
                    }
                }
            }
        }

        let hits = self.search_like(query, limit)?;
        Ok(SearchOutcome {
            hits,
            method: SearchMethod::LikeFallback,
        })
    }

    fn search_fts(&self, fts_query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn()?;
        // Column weights: type name outranks display name outranks
        // description. Ties break lexicographically by type.
        let mut stmt = conn.prepare(
            "SELECT node_type, display_name, description
             FROM nodes_fts
             WHERE nodes_fts MATCH ?1
             ORDER BY bm25(nodes_fts, 10.0, 5.0, 1.0), node_type
             LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], |r| {
                Ok(SearchHit {
                    node_type: r.get(0)?,
                    display_name: r.get(1)?,
                    description: r.get(2)?,
                    score: None,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(hits)
    }

    fn search_like(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn()?;
        let needle = format!("%{}%", query.trim().to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT DISTINCT node_type, display_name, description
             FROM nodes
             WHERE lower(node_type) LIKE ?1 OR lower(display_name) LIKE ?1
             ORDER BY node_type
             LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![needle, limit as i64], |r| {
                Ok(SearchHit {
                    node_type: r.get(0)?,
                    display_name: r.get(1)?,
                    description: r.get(2)?,
                    score: None,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(hits)
    }

    fn search_fuzzy(&self, query: &str, limit: usize) -> Result<SearchOutcome> {
        let mut scored: Vec<(f64, SearchHit)> = self
            .fuzzy_candidates()?
            .into_iter()
            .filter_map(|(cand, display_name, description)| {
                let s = fuzzy::score(query, &cand);
                (s >= fuzzy::MIN_FUZZY_SCORE).then(|| {
                    (
                        s,
                        SearchHit {
                            node_type: cand.node_type,
                            display_name,
                            description,
                            score: Some(s),
                        },
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.node_type.cmp(&b.1.node_type))
        });
        scored.truncate(limit);

        Ok(SearchOutcome {
            hits: scored.into_iter().map(|(_, h)| h).collect(),
            method: SearchMethod::Fuzzy,
        })
    }

    fn fuzzy_candidates(&self) -> Result<Vec<(fuzzy::FuzzyCandidate, String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT node_type, display_name, category, package, description FROM nodes",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    fuzzy::FuzzyCandidate {
                        node_type: r.get(0)?,
                        display_name: r.get(1)?,
                        category: r.get(2)?,
                        package: r.get(3)?,
                    },
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }

    /// Similarity suggestions for an unknown node type, best first.
    /// Scores are normalized edit-distance similarity (0..1); only
    /// suggestions at or above [`fuzzy::AUTOFIX_SUGGESTION_THRESHOLD`]
    /// qualify for auto-fixes.
    pub fn suggest_similar(&self, unknown: &str, limit: usize) -> Result<Vec<TypeSuggestion>> {
        let mut scored: Vec<TypeSuggestion> = self
            .fuzzy_candidates()?
            .into_iter()
            .map(|(cand, _, _)| TypeSuggestion {
                score: fuzzy::suggestion_similarity(unknown, &cand),
                node_type: cand.node_type,
            })
            .filter(|s| s.score >= 0.5)
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_type.cmp(&b.node_type))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

fn is_empty_schema(schema: &Value) -> bool {
    match schema {
        Value::Array(a) => a.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE name = ?1 LIMIT 1",
            params![name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// -----------------------------------------------------------------------------
// Query sanitization
// -----------------------------------------------------------------------------

/// Tokenize user input and neutralize the closed FTS meta-character set.
/// Every surviving token is double-quoted; returns None when nothing
/// survives (the caller then uses the LIKE fallback).
pub fn sanitize_fts_query(query: &str, mode: SearchMode) -> Option<String> {
    let joiner = match mode {
        SearchMode::And => " AND ",
        _ => " OR ",
    };
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|tok| {
            tok.chars()
                .filter(|c| !FTS_META.contains(c))
                .collect::<String>()
        })
        .filter(|tok| !tok.is_empty())
        .map(|tok| format!("\"{tok}\""))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(joiner))
    }
}

// -----------------------------------------------------------------------------
// Ingest (used by the catalog build step and test fixtures)
// -----------------------------------------------------------------------------

/// A writable row for catalog construction. Runtime code never writes;
/// this surface exists for the bundler and for tests.
#[derive(Debug, Clone, Default)]
pub struct CatalogRow {
    pub node_type: String,
    pub version: String,
    pub display_name: String,
    pub category: String,
    pub package: String,
    pub description: String,
    pub is_ai_tool: bool,
    pub is_trigger: bool,
    pub is_webhook: bool,
    pub output_classes: Vec<String>,
    pub output_arity: u32,
    pub variadic_outputs: bool,
    pub required_properties: Vec<String>,
    pub properties: Value,
}

pub struct CatalogBuilder {
    conn: Connection,
    with_fts: bool,
}

impl CatalogBuilder {
    pub fn create(path: impl AsRef<Path>, with_fts: bool) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("Failed to create catalog DB")?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS nodes (
                node_type TEXT NOT NULL,
                version TEXT NOT NULL,
                display_name TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                package TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                is_ai_tool INTEGER NOT NULL DEFAULT 0,
                is_trigger INTEGER NOT NULL DEFAULT 0,
                is_webhook INTEGER NOT NULL DEFAULT 0,
                output_classes TEXT NOT NULL DEFAULT '[\"main\"]',
                output_arity INTEGER NOT NULL DEFAULT 1,
                variadic_outputs INTEGER NOT NULL DEFAULT 0,
                required_properties TEXT NOT NULL DEFAULT '[]',
                properties TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (node_type, version)
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_category ON nodes(category);
            COMMIT;",
        )?;
        if with_fts {
            conn.execute_batch(
                "CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts
                 USING fts5(node_type, display_name, description);",
            )?;
        }
        Ok(Self { conn, with_fts })
    }

    pub fn insert(&mut self, row: &CatalogRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO nodes (node_type, version, display_name, category, package,
                                description, is_ai_tool, is_trigger, is_webhook,
                                output_classes, output_arity, variadic_outputs,
                                required_properties, properties)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.node_type,
                row.version,
                row.display_name,
                row.category,
                row.package,
                row.description,
                row.is_ai_tool as i64,
                row.is_trigger as i64,
                row.is_webhook as i64,
                serde_json::to_string(&row.output_classes)?,
                row.output_arity,
                row.variadic_outputs as i64,
                serde_json::to_string(&row.required_properties)?,
                serde_json::to_string(&row.properties)?,
            ],
        )?;
        if self.with_fts {
            // One FTS row per type; re-inserting a second version of the
            // same type would double-count, so callers insert versions of
            // a type consecutively and we dedup here.
            let exists: Option<i64> = self
                .conn
                .query_row(
                    "SELECT 1 FROM nodes_fts WHERE node_type = ?1 LIMIT 1",
                    params![row.node_type],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_none() {
                self.conn.execute(
                    "INSERT INTO nodes_fts (node_type, display_name, description)
                     VALUES (?1, ?2, ?3)",
                    params![row.node_type, row.display_name, row.description],
                )?;
            }
        }
        Ok(())
    }
}
