// src/jsonpath.rs
//
// =============================================================================
// N8N-CLI: PARAMETER PATH WALKER
// =============================================================================
//
// Fix and diff operations address node parameters with dotted paths that
// may carry index syntax: `a.b[3].c`. This module gives that syntax an
// explicit representation and a get/set/delete walker over serde_json
// values. Set creates intermediate containers on demand; delete of a
// missing path is a no-op.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(pub Vec<PathSeg>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub message: String,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid field path: {}", self.message)
    }
}

impl std::error::Error for PathError {}

fn err(message: impl Into<String>) -> PathError {
    PathError {
        message: message.into(),
    }
}

impl FieldPath {
    /// Parse `a.b[3].c` into segments. Rules:
    /// - dots separate keys; `[N]` after a key or another index is an index
    /// - empty keys (`a..b`, leading/trailing dot) are rejected
    /// - an unclosed or non-numeric bracket is rejected
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(err("empty path"));
        }
        let mut segs = Vec::new();
        let mut chars = raw.chars().peekable();
        let mut current = String::new();
        let mut expect_key = true;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if expect_key && current.is_empty() {
                        return Err(err(format!("empty segment in '{raw}'")));
                    }
                    if !current.is_empty() {
                        segs.push(PathSeg::Key(std::mem::take(&mut current)));
                    }
                    expect_key = true;
                }
                '[' => {
                    if !current.is_empty() {
                        segs.push(PathSeg::Key(std::mem::take(&mut current)));
                    } else if segs.is_empty() {
                        return Err(err(format!("path '{raw}' starts with an index")));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(other) => {
                                return Err(err(format!("unexpected '{other}' in index of '{raw}'")))
                            }
                            None => return Err(err(format!("unclosed index in '{raw}'"))),
                        }
                    }
                    if digits.is_empty() {
                        return Err(err(format!("empty index in '{raw}'")));
                    }
                    let idx: usize = digits
                        .parse()
                        .map_err(|_| err(format!("index overflow in '{raw}'")))?;
                    segs.push(PathSeg::Index(idx));
                    expect_key = false;
                }
                other => {
                    current.push(other);
                    expect_key = false;
                }
            }
        }
        if expect_key && current.is_empty() {
            return Err(err(format!("trailing dot in '{raw}'")));
        }
        if !current.is_empty() {
            segs.push(PathSeg::Key(current));
        }
        Ok(Self(segs))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First segment's key, if the path starts with a key.
    pub fn head_key(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathSeg::Key(k)) => Some(k.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                PathSeg::Key(k) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{k}")?;
                }
                PathSeg::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// WALKERS
// ============================================================================

/// Read the value at `path`, or None when any segment is missing or the
/// container kind does not match the segment.
pub fn get<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut cur = root;
    for seg in &path.0 {
        cur = match seg {
            PathSeg::Key(k) => cur.as_object()?.get(k)?,
            PathSeg::Index(i) => cur.as_array()?.get(*i)?,
        };
    }
    Some(cur)
}

/// Write `value` at `path`, creating intermediate objects/arrays on demand.
/// Arrays are padded with nulls when an index lands past the end. Fails
/// when an existing value of the wrong kind blocks the walk.
pub fn set(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), PathError> {
    if path.is_empty() {
        *root = value;
        return Ok(());
    }
    let mut cur = root;
    for (pos, seg) in path.0.iter().enumerate() {
        let last = pos == path.0.len() - 1;
        match seg {
            PathSeg::Key(k) => {
                if cur.is_null() {
                    *cur = Value::Object(Map::new());
                }
                let obj = cur
                    .as_object_mut()
                    .ok_or_else(|| err(format!("segment '{k}' expects an object")))?;
                if last {
                    obj.insert(k.clone(), value);
                    return Ok(());
                }
                cur = obj.entry(k.clone()).or_insert(Value::Null);
            }
            PathSeg::Index(i) => {
                if cur.is_null() {
                    *cur = Value::Array(Vec::new());
                }
                let arr = cur
                    .as_array_mut()
                    .ok_or_else(|| err(format!("segment [{i}] expects an array")))?;
                while arr.len() <= *i {
                    arr.push(Value::Null);
                }
                if last {
                    arr[*i] = value;
                    return Ok(());
                }
                cur = &mut arr[*i];
            }
        }
    }
    unreachable!("loop returns on the last segment")
}

/// Remove the value at `path`. Returns the removed value, or None when the
/// path did not resolve. Array deletion shifts later elements left.
pub fn delete(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.0.split_last()?;
    let mut cur = root;
    for seg in parents {
        cur = match seg {
            PathSeg::Key(k) => cur.as_object_mut()?.get_mut(k)?,
            PathSeg::Index(i) => cur.as_array_mut()?.get_mut(*i)?,
        };
    }
    match last {
        PathSeg::Key(k) => cur.as_object_mut()?.remove(k),
        PathSeg::Index(i) => {
            let arr = cur.as_array_mut()?;
            if *i < arr.len() {
                Some(arr.remove(*i))
            } else {
                None
            }
        }
    }
}
