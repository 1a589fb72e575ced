//! Field-list projection: SELECT (transform) and FOREACH (collect).
//!
//! Projection folds left to right and threads the in-flight input, so
//! an alias defined by one entry is visible to the expressions of every
//! later entry in the same list. That visibility is a contract rule
//! authors rely on, not an accident of implementation.

use crate::coerce::ensure_list;
use crate::document::{merge, put_path};
use crate::expr::eval_expr;
use crate::runtime::Engine;
use crate::types::{EvalError, Expr, FieldEntry, Value};

/// The collection a FOREACH projection produced: the binding key and
/// the item list.
pub type Collection = (String, Vec<Value>);

/// Execute a field list in transform mode, producing the projected
/// mapping.
pub fn select_and_transform(
    fields: &[FieldEntry],
    input: &Value,
    engine: &Engine,
) -> Result<Value, EvalError> {
    let mut output = Value::map();
    let mut current = input.clone();
    for entry in fields {
        match entry {
            FieldEntry::Wildcard => {
                output = merge(&output, &current);
            }
            FieldEntry::Aliased { expr, alias } => {
                let v = eval_expr(expr, &current, engine)?;
                let path = [alias.clone()];
                output = put_path(&path, v.clone(), &output);
                current = put_path(&path, v, &current);
            }
            FieldEntry::Bare(expr) => {
                let v = eval_expr(expr, &current, engine)?;
                let key = derive_key(expr, &v)?;
                output = put_path(&[key], v, &output);
            }
        }
    }
    Ok(output)
}

/// Execute a field list in collect mode: like transform, but the last
/// entry also determines the collection -- its alias (or derived key,
/// or the literal `item`) becomes the binding key, and its value runs
/// through the list coercion.
pub fn select_and_collect(
    fields: &[FieldEntry],
    input: &Value,
    engine: &Engine,
) -> Result<(Value, Collection), EvalError> {
    let mut output = Value::map();
    let mut current = input.clone();
    let mut collection: Collection = ("item".to_string(), Vec::new());
    for (idx, entry) in fields.iter().enumerate() {
        let last = idx + 1 == fields.len();
        match entry {
            FieldEntry::Wildcard => {
                output = merge(&output, &current);
                if last {
                    collection = ("item".to_string(), ensure_list(&current));
                }
            }
            FieldEntry::Aliased { expr, alias } => {
                let v = eval_expr(expr, &current, engine)?;
                let path = [alias.clone()];
                if last {
                    output = put_path(&path, v.clone(), &output);
                    collection = (alias.clone(), ensure_list(&v));
                } else {
                    output = put_path(&path, v.clone(), &output);
                    current = put_path(&path, v, &current);
                }
            }
            FieldEntry::Bare(expr) => {
                let v = eval_expr(expr, &current, engine)?;
                // In collect mode an unnameable last entry falls back to
                // the `item` binding instead of failing.
                let key = derive_key(expr, &v).unwrap_or_else(|_| "item".to_string());
                output = put_path(&[key.clone()], v.clone(), &output);
                if last {
                    collection = (key, ensure_list(&v));
                }
            }
        }
    }
    Ok((output, collection))
}

/// Derive the output key for a bare field entry: the path's last
/// component for a variable, the text of a textual constant, or the
/// value itself when textual. Anything else cannot name a key.
fn derive_key(expr: &Expr, value: &Value) -> Result<String, EvalError> {
    match expr {
        Expr::Var(path) => match path.last() {
            Some(last) => Ok(last.clone()),
            None => Err(EvalError::Eval {
                message: "empty variable path in projection".to_string(),
            }),
        },
        Expr::Const(Value::Text(s)) | Expr::Const(Value::Atom(s)) => Ok(s.clone()),
        _ => match value {
            Value::Text(s) | Value::Atom(s) => Ok(s.clone()),
            other => Err(EvalError::Eval {
                message: format!(
                    "cannot derive a projection key from a {} value; add an alias",
                    other.type_name()
                ),
            }),
        },
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
