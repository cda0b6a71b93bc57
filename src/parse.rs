// src/parse.rs
//
// =============================================================================
// N8N-CLI: WORKFLOW DOCUMENT PARSER
// =============================================================================
//
// Parses workflow JSON as received from files or the server.
//
// Two modes:
// - strict (default): RFC 8259 JSON only.
// - relaxed (opt-in): a repair pass first strips comments and trailing
//   commas and quotes bare object keys, then the result is parsed strictly.
//
// Both modes enforce a 10 MiB size cap and a nesting cap of 100, and report
// failures with line/column.

use crate::core::Workflow;
use crate::errors::CliError;
use serde_json::Value;

pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_NESTING_DEPTH: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Accept the relaxed superset (comments, trailing commas, bare keys).
    pub relaxed: bool,
}

/// Parse a workflow document under the configured mode and the hard caps.
pub fn parse_workflow(text: &str, opts: &ParseOptions) -> Result<Workflow, CliError> {
    let value = parse_value(text, opts)?;
    serde_json::from_value(value).map_err(|e| CliError::ParseFailed {
        line: 0,
        column: 0,
        message: format!("document is not a workflow: {e}"),
    })
}

/// Parse to a raw value. Shared by the workflow parser and the diff-ops
/// file loader.
pub fn parse_value(text: &str, opts: &ParseOptions) -> Result<Value, CliError> {
    if text.len() > MAX_DOCUMENT_BYTES {
        return Err(CliError::ParseFailed {
            line: 0,
            column: 0,
            message: format!(
                "document is {} bytes, the cap is {} bytes",
                text.len(),
                MAX_DOCUMENT_BYTES
            ),
        });
    }

    let result = if opts.relaxed {
        let repaired = repair(text);
        serde_json::from_str::<Value>(&repaired)
    } else {
        serde_json::from_str::<Value>(text)
    };

    let value = result.map_err(|e| CliError::ParseFailed {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })?;

    let depth = measure_depth(&value);
    if depth > MAX_NESTING_DEPTH {
        return Err(CliError::ParseFailed {
            line: 0,
            column: 0,
            message: format!("nesting depth {depth} exceeds the cap of {MAX_NESTING_DEPTH}"),
        });
    }

    Ok(value)
}

/// Pretty serialization. The inverse of [`parse_workflow`] up to the key
/// ordering of unordered mappings.
pub fn serialize_workflow(workflow: &Workflow) -> Result<String, CliError> {
    serde_json::to_string_pretty(workflow)
        .map_err(|e| CliError::internal(format!("workflow serialization failed: {e}")))
}

/// Iterative depth measurement. The document was just parsed from JSON so
/// it is acyclic; an explicit worklist still keeps us off the call stack
/// for adversarial inputs.
fn measure_depth(root: &Value) -> usize {
    let mut max = 1;
    let mut stack: Vec<(&Value, usize)> = vec![(root, 1)];
    while let Some((value, depth)) = stack.pop() {
        max = max.max(depth);
        match value {
            Value::Object(map) => stack.extend(map.values().map(|v| (v, depth + 1))),
            Value::Array(items) => stack.extend(items.iter().map(|v| (v, depth + 1))),
            _ => {}
        }
    }
    max
}

// ============================================================================
// REPAIR PASS
// ============================================================================

/// Rewrite the relaxed superset into strict JSON:
/// - `// ...` and `/* ... */` comments become spaces (newlines preserved,
///   so error positions of a later strict failure stay meaningful)
/// - trailing commas before `}` / `]` are dropped
/// - bare object keys are double-quoted
///
/// String literals are passed through untouched, escapes included.
fn repair(input: &str) -> String {
    let stripped = strip_comments(input);
    let no_trailing = strip_trailing_commas(&stripped);
    quote_bare_keys(&no_trailing)
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '/' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == '*' && bytes[i + 1] == '/') {
                    if bytes[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ',' {
            // Look ahead past whitespace for a closing bracket.
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1; // drop the comma, keep the whitespace
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn quote_bare_keys(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut in_string = false;
    // The last structural character seen outside strings. A bare key can
    // only follow '{' or ','.
    let mut last_structural = ' ';

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '{' | ',' | '}' | '[' | ']' | ':' => {
                last_structural = c;
                out.push(c);
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c if (c.is_alphabetic() || c == '_' || c == '$')
                && (last_structural == '{' || last_structural == ',') =>
            {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                // Only a key if a colon follows (ignoring whitespace).
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ':' {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
                last_structural = ' ';
            }
            other => {
                last_structural = ' ';
                out.push(other);
                i += 1;
            }
        }
    }
    out
}
