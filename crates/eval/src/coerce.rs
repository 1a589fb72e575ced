//! Loose coercion helpers shared by the evaluator and the projector.

use crate::interchange::value_from_json;
use crate::types::{EvalError, Value};

/// Parse a textual number: integer first, floating-point second.
pub fn text_to_number(text: &str) -> Result<Value, EvalError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(x) = text.parse::<f64>() {
        return Ok(Value::Float(x));
    }
    Err(EvalError::Coercion {
        input: text.to_string(),
    })
}

/// View a value as a mapping, decoding textual JSON opportunistically.
///
/// Anything that is not a mapping and does not decode to one yields the
/// empty mapping. Never fails.
pub fn ensure_map(v: &Value) -> Value {
    match v {
        Value::Map(_) => v.clone(),
        Value::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json) => {
                let decoded = value_from_json(&json);
                match decoded {
                    Value::Map(_) => decoded,
                    _ => Value::map(),
                }
            }
            Err(_) => Value::map(),
        },
        _ => Value::map(),
    }
}

/// View a value as a list; anything else is the empty list.
pub fn ensure_list(v: &Value) -> Vec<Value> {
    match v {
        Value::List(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Canonical UTF-8 rendering of a symbolic atom.
pub fn atom_to_text(name: &str) -> Value {
    Value::Text(name.to_string())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
