//! Expression evaluation.
//!
//! `eval_expr` never fails on absent values -- a missing path reads as
//! `Null` and the function library decides how absence propagates
//! through arithmetic. Reads under `payload` go through the per-input
//! scratch cache so the decoded payload is shared by every rule applied
//! to the same input.

use crate::cache;
use crate::document::get_path;
use crate::library::FnOutcome;
use crate::predicate::match_pred;
use crate::runtime::Engine;
use crate::types::{CaseCond, EvalError, Expr, Value};

/// Evaluate an expression against a document.
pub fn eval_expr(expr: &Expr, doc: &Value, engine: &Engine) -> Result<Value, EvalError> {
    match expr {
        Expr::Var(path) => Ok(read_var(path, doc)),

        Expr::Const(v) => Ok(v.clone()),

        Expr::Arith { op, left, right } => {
            let l = eval_expr(left, doc, engine)?;
            let r = eval_expr(right, doc, engine)?;
            call_library(engine, op, vec![l, r], doc)
        }

        Expr::Case {
            subject: None,
            clauses,
            fallback,
        } => {
            for clause in clauses {
                match &clause.cond {
                    CaseCond::When(pred) => {
                        if match_pred(pred, doc, engine)? {
                            return eval_expr(&clause.then, doc, engine);
                        }
                    }
                    CaseCond::Match(_) => {
                        return Err(EvalError::Eval {
                            message: "match clause in a subject-less case".to_string(),
                        })
                    }
                }
            }
            fallback_value(fallback.as_deref(), doc, engine)
        }

        Expr::Case {
            subject: Some(subject),
            clauses,
            fallback,
        } => {
            // The subject is evaluated exactly once.
            let subject = eval_expr(subject, doc, engine)?;
            for clause in clauses {
                match &clause.cond {
                    CaseCond::Match(candidate) => {
                        if eval_expr(candidate, doc, engine)?.loosely_eq(&subject) {
                            return eval_expr(&clause.then, doc, engine);
                        }
                    }
                    CaseCond::When(_) => {
                        return Err(EvalError::Eval {
                            message: "predicate clause in a subject case".to_string(),
                        })
                    }
                }
            }
            fallback_value(fallback.as_deref(), doc, engine)
        }

        Expr::Call { name, args } => {
            // Arguments evaluate left to right.
            let mut vals = Vec::with_capacity(args.len());
            for arg in args {
                vals.push(eval_expr(arg, doc, engine)?);
            }
            call_library(engine, name, vals, doc)
        }
    }
}

fn fallback_value(
    fallback: Option<&Expr>,
    doc: &Value,
    engine: &Engine,
) -> Result<Value, EvalError> {
    match fallback {
        Some(e) => eval_expr(e, doc, engine),
        None => Ok(Value::Null),
    }
}

fn read_var(path: &[String], doc: &Value) -> Value {
    match path.split_first() {
        Some((head, rest)) if head == "payload" => cache::payload_field(rest, doc),
        _ => get_path(path, doc).cloned().unwrap_or(Value::Null),
    }
}

/// Invoke the function library, applying a returned closure once to the
/// current document.
pub(crate) fn call_library(
    engine: &Engine,
    name: &str,
    args: Vec<Value>,
    doc: &Value,
) -> Result<Value, EvalError> {
    match engine.funcs.call(name, &args)? {
        FnOutcome::Value(v) => Ok(v),
        FnOutcome::Applied(f) => f(doc),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CaseClause, Pred};
    use std::collections::BTreeMap;

    fn engine() -> Engine {
        Engine::builtin()
    }

    fn doc(pairs: &[(&str, Value)]) -> Value {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        Value::Map(map)
    }

    fn var(p: &str) -> Expr {
        Expr::Var(p.split('.').map(|s| s.to_string()).collect())
    }

    #[test]
    fn var_reads_and_missing_is_null() {
        let d = doc(&[("a", Value::Int(3))]);
        assert_eq!(eval_expr(&var("a"), &d, &engine()).unwrap(), Value::Int(3));
        assert_eq!(eval_expr(&var("zz"), &d, &engine()).unwrap(), Value::Null);
    }

    #[test]
    fn arith_goes_through_the_library() {
        let d = doc(&[("a", Value::Int(3))]);
        let e = Expr::Arith {
            op: "+".to_string(),
            left: Box::new(var("a")),
            right: Box::new(Expr::Const(Value::Int(4))),
        };
        assert_eq!(eval_expr(&e, &d, &engine()).unwrap(), Value::Int(7));
    }

    #[test]
    fn arith_on_absent_propagates_absence() {
        let d = doc(&[]);
        let e = Expr::Arith {
            op: "+".to_string(),
            left: Box::new(var("missing")),
            right: Box::new(Expr::Const(Value::Int(4))),
        };
        assert_eq!(eval_expr(&e, &d, &engine()).unwrap(), Value::Null);
    }

    #[test]
    fn case_without_subject_scans_predicates() {
        let d = doc(&[("n", Value::Int(10))]);
        let e = Expr::Case {
            subject: None,
            clauses: vec![
                CaseClause {
                    cond: CaseCond::When(Pred::Cmp {
                        op: "<".to_string(),
                        left: Box::new(var("n")),
                        right: Box::new(Expr::Const(Value::Int(5))),
                    }),
                    then: Expr::Const(Value::Text("small".to_string())),
                },
                CaseClause {
                    cond: CaseCond::When(Pred::True),
                    then: Expr::Const(Value::Text("big".to_string())),
                },
            ],
            fallback: None,
        };
        assert_eq!(
            eval_expr(&e, &d, &engine()).unwrap(),
            Value::Text("big".to_string())
        );
    }

    #[test]
    fn case_with_subject_matches_by_value() {
        let d = doc(&[("status", Value::Atom("online".to_string()))]);
        let e = Expr::Case {
            subject: Some(Box::new(var("status"))),
            clauses: vec![CaseClause {
                cond: CaseCond::Match(Expr::Const(Value::Atom("online".to_string()))),
                then: Expr::Const(Value::Int(1)),
            }],
            fallback: Some(Box::new(Expr::Const(Value::Int(0)))),
        };
        assert_eq!(eval_expr(&e, &d, &engine()).unwrap(), Value::Int(1));
    }

    #[test]
    fn case_falls_through_to_null_without_else() {
        let d = doc(&[]);
        let e = Expr::Case {
            subject: None,
            clauses: vec![CaseClause {
                cond: CaseCond::When(Pred::Not(Box::new(Expr::Const(Value::Bool(true))))),
                then: Expr::Const(Value::Int(1)),
            }],
            fallback: None,
        };
        assert_eq!(eval_expr(&e, &d, &engine()).unwrap(), Value::Null);
    }

    #[test]
    fn call_applies_returned_closure_to_the_document() {
        let d = doc(&[("room", Value::Text("kitchen".to_string()))]);
        let e = Expr::Call {
            name: "context".to_string(),
            args: vec![Expr::Const(Value::Text("room".to_string()))],
        };
        assert_eq!(
            eval_expr(&e, &d, &engine()).unwrap(),
            Value::Text("kitchen".to_string())
        );
    }

    #[test]
    fn payload_reads_use_the_decoded_mapping() {
        crate::cache::clear_rule_payload();
        let d = doc(&[("payload", Value::Text("{\"k\":1}".to_string()))]);
        assert_eq!(
            eval_expr(&var("payload.k"), &d, &engine()).unwrap(),
            Value::Int(1)
        );
        crate::cache::clear_rule_payload();
    }
}
