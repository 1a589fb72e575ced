//! Function library seam and the builtin library.
//!
//! Rule expressions reach the library two ways: explicit calls, and
//! arithmetic operators dispatched under their own names. A call may
//! answer with a plain value, or with a unary closure that the
//! evaluator applies once to the current document -- that is how
//! library-side helpers partially apply over the input context.

use crate::coerce::ensure_list;
use crate::document::get_path;
use crate::types::{EvalError, Value};

/// A library-produced closure awaiting the current document.
pub type AppliedFn = Box<dyn Fn(&Value) -> Result<Value, EvalError>>;

/// What a library call produced.
pub enum FnOutcome {
    Value(Value),
    Applied(AppliedFn),
}

impl std::fmt::Debug for FnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FnOutcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FnOutcome::Applied(_) => f.debug_tuple("Applied").field(&"<closure>").finish(),
        }
    }
}

/// The function library consumed by the evaluator. Names are symbolic;
/// arithmetic operators arrive under their operator strings.
pub trait FunctionLibrary: Send + Sync {
    fn call(&self, name: &str, args: &[Value]) -> Result<FnOutcome, EvalError>;
}

// ──────────────────────────────────────────────
// Builtin library
// ──────────────────────────────────────────────

/// Arithmetic plus a small set of string and list helpers. Arithmetic
/// on an absent operand propagates the absence instead of failing.
pub struct BuiltinLibrary;

impl FunctionLibrary for BuiltinLibrary {
    fn call(&self, name: &str, args: &[Value]) -> Result<FnOutcome, EvalError> {
        match name {
            "+" | "-" | "*" | "/" | "div" | "mod" => arith(name, args).map(FnOutcome::Value),
            "concat" => concat(args).map(FnOutcome::Value),
            "lower" => {
                let s = text_arg(name, args, 0)?;
                Ok(FnOutcome::Value(Value::Text(s.to_lowercase())))
            }
            "upper" => {
                let s = text_arg(name, args, 0)?;
                Ok(FnOutcome::Value(Value::Text(s.to_uppercase())))
            }
            "len" => {
                arity(name, args, 1)?;
                let n = match &args[0] {
                    Value::List(items) => items.len(),
                    Value::Text(s) => s.chars().count(),
                    other => {
                        return Err(EvalError::Eval {
                            message: format!("len: expected list or text, got {}", other.type_name()),
                        })
                    }
                };
                Ok(FnOutcome::Value(Value::Int(n as i64)))
            }
            "nth" => {
                arity(name, args, 2)?;
                let n = match &args[0] {
                    Value::Int(n) if *n >= 1 => *n as usize,
                    other => {
                        return Err(EvalError::Eval {
                            message: format!("nth: expected positive index, got {:?}", other),
                        })
                    }
                };
                let items = ensure_list(&args[1]);
                Ok(FnOutcome::Value(
                    items.get(n - 1).cloned().unwrap_or(Value::Null),
                ))
            }
            "contains" => {
                arity(name, args, 2)?;
                let found = match &args[0] {
                    Value::List(items) => items.iter().any(|v| v.loosely_eq(&args[1])),
                    Value::Text(s) => match &args[1] {
                        Value::Text(sub) | Value::Atom(sub) => s.contains(sub.as_str()),
                        _ => false,
                    },
                    _ => false,
                };
                Ok(FnOutcome::Value(Value::Bool(found)))
            }
            // Defers the read to the current document: `context('a.b')`
            // evaluates to whatever lives at that path in the input the
            // rule is being applied to.
            "context" => {
                let path_text = text_arg(name, args, 0)?;
                let path: Vec<String> = path_text.split('.').map(|s| s.to_string()).collect();
                Ok(FnOutcome::Applied(Box::new(move |doc: &Value| {
                    Ok(get_path(&path, doc).cloned().unwrap_or(Value::Null))
                })))
            }
            _ => Err(EvalError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Eval {
            message: format!(
                "{}: expected {} argument(s), got {}",
                name,
                expected,
                args.len()
            ),
        })
    }
}

fn text_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, EvalError> {
    match args.get(index) {
        Some(Value::Text(s)) | Some(Value::Atom(s)) => Ok(s.as_str()),
        other => Err(EvalError::Eval {
            message: format!("{}: expected a textual argument, got {:?}", name, other),
        }),
    }
}

fn arith(op: &str, args: &[Value]) -> Result<Value, EvalError> {
    arity(op, args, 2)?;
    // Absent operands propagate absence.
    if matches!(args[0], Value::Null) || matches!(args[1], Value::Null) {
        return Ok(Value::Null);
    }
    match (&args[0], &args[1]) {
        (Value::Int(l), Value::Int(r)) => int_arith(op, *l, *r),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            let (l, r) = (l.as_f64().expect("numeric"), r.as_f64().expect("numeric"));
            float_arith(op, l, r)
        }
        (l, r) => Err(EvalError::Eval {
            message: format!(
                "{}: expected numeric operands, got {} and {}",
                op,
                l.type_name(),
                r.type_name()
            ),
        }),
    }
}

fn int_arith(op: &str, l: i64, r: i64) -> Result<Value, EvalError> {
    match op {
        "+" => Ok(Value::Int(l.wrapping_add(r))),
        "-" => Ok(Value::Int(l.wrapping_sub(r))),
        "*" => Ok(Value::Int(l.wrapping_mul(r))),
        "/" => {
            if r == 0 {
                Err(EvalError::Eval {
                    message: "division by zero".to_string(),
                })
            } else {
                Ok(Value::Float(l as f64 / r as f64))
            }
        }
        "div" => {
            if r == 0 {
                Err(EvalError::Eval {
                    message: "division by zero".to_string(),
                })
            } else {
                Ok(Value::Int(l / r))
            }
        }
        "mod" => {
            if r == 0 {
                Err(EvalError::Eval {
                    message: "division by zero".to_string(),
                })
            } else {
                Ok(Value::Int(l % r))
            }
        }
        _ => Err(EvalError::InvalidOperator { op: op.to_string() }),
    }
}

fn float_arith(op: &str, l: f64, r: f64) -> Result<Value, EvalError> {
    match op {
        "+" => Ok(Value::Float(l + r)),
        "-" => Ok(Value::Float(l - r)),
        "*" => Ok(Value::Float(l * r)),
        "/" => {
            if r == 0.0 {
                Err(EvalError::Eval {
                    message: "division by zero".to_string(),
                })
            } else {
                Ok(Value::Float(l / r))
            }
        }
        "div" | "mod" => Err(EvalError::Eval {
            message: format!("{}: integer operands required", op),
        }),
        _ => Err(EvalError::InvalidOperator { op: op.to_string() }),
    }
}

fn concat(args: &[Value]) -> Result<Value, EvalError> {
    // Two lists concatenate; otherwise textual renderings concatenate.
    if let [Value::List(l), Value::List(r)] = args {
        let mut out = l.clone();
        out.extend(r.iter().cloned());
        return Ok(Value::List(out));
    }
    let mut out = String::new();
    for arg in args {
        match arg {
            Value::Text(s) | Value::Atom(s) => out.push_str(s),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(x) => out.push_str(&x.to_string()),
            other => {
                return Err(EvalError::Eval {
                    message: format!("concat: cannot render {} as text", other.type_name()),
                })
            }
        }
    }
    Ok(Value::Text(out))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
