//! Predicate matching and cross-type comparison.
//!
//! Connectives short-circuit. Filters fail closed: a non-boolean under
//! `Not` or a non-boolean function result used as a predicate yields
//! false. Comparisons across uncoercible types fail loudly instead, so
//! authors see the misuse.

use std::cmp::Ordering;

use crate::coerce::{atom_to_text, text_to_number};
use crate::expr::{call_library, eval_expr};
use crate::runtime::Engine;
use crate::types::{EvalError, Pred, Value};

/// Evaluate a predicate against a document.
pub fn match_pred(pred: &Pred, doc: &Value, engine: &Engine) -> Result<bool, EvalError> {
    match pred {
        Pred::True => Ok(true),

        Pred::And(left, right) => {
            Ok(match_pred(left, doc, engine)? && match_pred(right, doc, engine)?)
        }

        Pred::Or(left, right) => {
            Ok(match_pred(left, doc, engine)? || match_pred(right, doc, engine)?)
        }

        Pred::Not(operand) => {
            let v = eval_expr(operand, doc, engine)?;
            Ok(match v.as_bool() {
                Some(b) => !b,
                None => false,
            })
        }

        Pred::In { needle, list } => {
            let v = eval_expr(needle, doc, engine)?;
            for member in list {
                if eval_expr(member, doc, engine)?.loosely_eq(&v) {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        Pred::Call { name, args } => {
            let mut vals = Vec::with_capacity(args.len());
            for arg in args {
                vals.push(eval_expr(arg, doc, engine)?);
            }
            let out = call_library(engine, name, vals, doc)?;
            Ok(out.as_bool().unwrap_or(false))
        }

        Pred::Cmp { op, left, right } => {
            let l = eval_expr(left, doc, engine)?;
            let r = eval_expr(right, doc, engine)?;
            compare(engine, op, &l, &r)
        }
    }
}

/// Apply a comparison operator after the cross-type coercion rules:
/// a textual side is parsed as a number when the other side is numeric,
/// and an atom is rendered as text when the other side is textual.
///
/// Ordering across incompatible types is deterministic, by a fixed
/// variant rank (`null < bool < numeric < atom < text < list < map`).
pub fn compare(engine: &Engine, op: &str, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let (l, r) = coerce_pair(left, right)?;
    match op {
        "=" => Ok(l.loosely_eq(&r)),
        "!=" | "<>" => Ok(!l.loosely_eq(&r)),
        "<" => Ok(order(&l, &r) == Ordering::Less),
        "<=" => Ok(order(&l, &r) != Ordering::Greater),
        ">" => Ok(order(&l, &r) == Ordering::Greater),
        ">=" => Ok(order(&l, &r) != Ordering::Less),
        "=~" => match (&l, &r) {
            (Value::Text(topic), Value::Text(pattern)) => {
                Ok(engine.topics.matches(topic, pattern))
            }
            _ => Err(EvalError::Eval {
                message: format!(
                    "'=~' requires textual operands, got {} and {}",
                    l.type_name(),
                    r.type_name()
                ),
            }),
        },
        _ => Err(EvalError::InvalidOperator { op: op.to_string() }),
    }
}

fn coerce_pair(left: &Value, right: &Value) -> Result<(Value, Value), EvalError> {
    match (left, right) {
        (l, Value::Text(s)) if l.is_numeric() => Ok((l.clone(), text_to_number(s)?)),
        (Value::Text(s), r) if r.is_numeric() => Ok((text_to_number(s)?, r.clone())),
        (Value::Atom(a), Value::Text(_)) => Ok((atom_to_text(a), right.clone())),
        (Value::Text(_), Value::Atom(a)) => Ok((left.clone(), atom_to_text(a))),
        _ => Ok((left.clone(), right.clone())),
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Atom(_) => 3,
        Value::Text(_) => 4,
        Value::List(_) => 5,
        Value::Map(_) => 6,
    }
}

/// Deterministic total order over values: numbers by magnitude, text
/// and atoms lexicographically, composites elementwise, and mixed
/// variants by rank.
pub(crate) fn order(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            let (l, r) = (l.as_f64().expect("numeric"), r.as_f64().expect("numeric"));
            l.total_cmp(&r)
        }
        (Value::Atom(l), Value::Atom(r)) => l.cmp(r),
        (Value::Text(l), Value::Text(r)) => l.cmp(r),
        (Value::List(l), Value::List(r)) => {
            for (lv, rv) in l.iter().zip(r.iter()) {
                let ord = order(lv, rv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            l.len().cmp(&r.len())
        }
        (Value::Map(l), Value::Map(r)) => {
            for ((lk, lv), (rk, rv)) in l.iter().zip(r.iter()) {
                let ord = lk.cmp(rk);
                if ord != Ordering::Equal {
                    return ord;
                }
                let ord = order(lv, rv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            l.len().cmp(&r.len())
        }
        _ => unreachable!("same rank implies same shape"),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
