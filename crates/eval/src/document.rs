//! Nested-path access over document values.
//!
//! Paths address mapping-of-mapping structure: `get_path` walks keys
//! left to right and answers `None` for any missing key or for a
//! traversal into a non-mapping. `put_path` builds a new document with
//! the path created or overwritten, preserving siblings. Both are pure
//! and never fail.

use std::collections::BTreeMap;

use crate::types::Value;

/// Read the value at `path`, if present.
pub fn get_path<'a>(path: &[String], doc: &'a Value) -> Option<&'a Value> {
    // Single-segment paths are the overwhelmingly common case.
    if let [key] = path {
        return match doc {
            Value::Map(map) => map.get(key),
            _ => None,
        };
    }
    let mut current = doc;
    for key in path {
        match current {
            Value::Map(map) => current = map.get(key)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Return a document with `value` placed at `path`.
///
/// Intermediate mappings are created as needed; an intermediate that
/// exists but is not a mapping is replaced by one.
pub fn put_path(path: &[String], value: Value, doc: &Value) -> Value {
    match path {
        [] => value,
        [key, rest @ ..] => {
            let mut map = match doc {
                Value::Map(map) => map.clone(),
                _ => BTreeMap::new(),
            };
            let child = map.get(key).cloned().unwrap_or(Value::Null);
            map.insert(key.clone(), put_path(rest, value, &child));
            Value::Map(map)
        }
    }
}

/// Shallow-merge two mappings, `overlay` winning on key collisions.
///
/// A non-mapping `base` contributes nothing; a non-mapping `overlay`
/// replaces the result outright.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Map(b), Value::Map(o)) => {
            let mut out = b.clone();
            for (k, v) in o {
                out.insert(k.clone(), v.clone());
            }
            Value::Map(out)
        }
        (_, Value::Map(_)) => overlay.clone(),
        (Value::Map(_), _) => base.clone(),
        _ => overlay.clone(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
