//! Loading compiled rules from interchange JSON.
//!
//! The SQL front-end compiles rule declarations elsewhere and hands the
//! runtime a JSON rendering of the AST. This module walks that JSON by
//! hand -- every malformed node gets a `Decode` error naming what was
//! missing rather than a generic parse failure.
//!
//! Expression nodes: `{"var": "a.b"}`, `{"const": <json>}`,
//! `{"atom": "name"}`, `{"op": "+", "left": .., "right": ..}`,
//! `{"call": "fn", "args": [..]}`, and
//! `{"case": {"subject"?, "clauses", "else"?}}`.
//! Predicate nodes: `true`, `{"op": "and"|"or"|"not"|<cmp>, ..}`,
//! `{"in": .., "list": [..]}`, and `{"call": ..}`.

use std::collections::BTreeMap;

use crate::types::{
    CaseClause, CaseCond, EvalError, Expr, FieldEntry, ForeachClause, Pred, Rule, Value,
};

// ──────────────────────────────────────────────
// Value conversions
// ──────────────────────────────────────────────

/// Convert JSON into a runtime value. Integral numbers become `Int`,
/// everything else numeric becomes `Float`. Plain JSON carries no
/// atoms; those only enter through `{"atom": ..}` literals.
pub fn value_from_json(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(obj) => {
            let mut map = BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), value_from_json(v));
            }
            Value::Map(map)
        }
    }
}

/// Convert a runtime value to JSON for output. Atoms render as plain
/// strings; a non-finite float renders as null.
pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) | Value::Atom(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

// ──────────────────────────────────────────────
// Rule parsing
// ──────────────────────────────────────────────

fn get_str(obj: &serde_json::Value, field: &str) -> Result<String, EvalError> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| EvalError::Decode {
            message: format!("missing string field '{}'", field),
        })
}

/// Parse a rule list: either a bare JSON array or an object with a
/// `rules` array.
pub fn parse_rules(v: &serde_json::Value) -> Result<Vec<Rule>, EvalError> {
    let entries = if let Some(arr) = v.as_array() {
        arr
    } else if let Some(arr) = v.get("rules").and_then(|r| r.as_array()) {
        arr
    } else {
        return Err(EvalError::Decode {
            message: "expected an array of rules or an object with a 'rules' array".to_string(),
        });
    };
    entries.iter().map(parse_rule).collect()
}

/// Parse a single compiled rule.
pub fn parse_rule(v: &serde_json::Value) -> Result<Rule, EvalError> {
    let id = get_str(v, "id")?;
    let enabled = v.get("enabled").and_then(|e| e.as_bool()).unwrap_or(true);

    let fields = v
        .get("fields")
        .and_then(|f| f.as_array())
        .ok_or_else(|| EvalError::Decode {
            message: format!("rule '{}' missing 'fields' array", id),
        })?
        .iter()
        .map(parse_field_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let conditions = match v.get("where") {
        Some(w) => parse_pred(w)?,
        None => Pred::True,
    };

    let actions: Vec<String> = v
        .get("actions")
        .and_then(|a| a.as_array())
        .map(|arr| {
            arr.iter()
                .map(|a| {
                    a.as_str().map(|s| s.to_string()).ok_or_else(|| EvalError::Decode {
                        message: format!("rule '{}': action ids must be strings", id),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    let foreach = match v.get("foreach") {
        Some(fe) => Some(parse_foreach(fe, &id)?),
        None => None,
    };

    Ok(Rule {
        id,
        enabled,
        fields,
        conditions,
        actions,
        foreach,
    })
}

fn parse_foreach(v: &serde_json::Value, rule_id: &str) -> Result<ForeachClause, EvalError> {
    let collect = v
        .get("collect")
        .and_then(|c| c.as_array())
        .ok_or_else(|| EvalError::Decode {
            message: format!("rule '{}': foreach missing 'collect' array", rule_id),
        })?
        .iter()
        .map(parse_field_entry)
        .collect::<Result<Vec<_>, _>>()?;
    let incase = match v.get("incase") {
        Some(p) => parse_pred(p)?,
        None => Pred::True,
    };
    let doeach = match v.get("doeach").and_then(|d| d.as_array()) {
        Some(arr) => arr
            .iter()
            .map(parse_field_entry)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(ForeachClause {
        collect,
        incase,
        doeach,
    })
}

/// Parse a field-list entry. `"*"` is the wildcard, any other bare
/// string is shorthand for a variable read, and objects carry an
/// expression with an optional alias.
pub fn parse_field_entry(v: &serde_json::Value) -> Result<FieldEntry, EvalError> {
    if let Some(s) = v.as_str() {
        if s == "*" {
            return Ok(FieldEntry::Wildcard);
        }
        return Ok(FieldEntry::Bare(Expr::Var(split_path(s))));
    }
    if v.get("alias").is_some() {
        let alias = get_str(v, "alias")?;
        let expr_node = v.get("expr").ok_or_else(|| EvalError::Decode {
            message: format!("aliased field '{}' missing 'expr'", alias),
        })?;
        return Ok(FieldEntry::Aliased {
            expr: parse_expr(expr_node)?,
            alias,
        });
    }
    Ok(FieldEntry::Bare(parse_expr(v)?))
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(|s| s.to_string()).collect()
}

/// Parse an expression node.
pub fn parse_expr(v: &serde_json::Value) -> Result<Expr, EvalError> {
    if let Some(path) = v.get("var") {
        let path = path.as_str().ok_or_else(|| EvalError::Decode {
            message: "'var' must be a dotted path string".to_string(),
        })?;
        return Ok(Expr::Var(split_path(path)));
    }

    if let Some(name) = v.get("atom") {
        let name = name.as_str().ok_or_else(|| EvalError::Decode {
            message: "'atom' must be a string".to_string(),
        })?;
        return Ok(Expr::Const(Value::Atom(name.to_string())));
    }

    if let Some(lit) = v.get("const") {
        return Ok(Expr::Const(value_from_json(lit)));
    }

    if v.get("call").is_some() {
        let name = get_str(v, "call")?;
        let args = match v.get("args").and_then(|a| a.as_array()) {
            Some(arr) => arr.iter().map(parse_expr).collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        return Ok(Expr::Call { name, args });
    }

    if let Some(case) = v.get("case") {
        return parse_case(case);
    }

    if v.get("op").is_some() {
        let op = get_str(v, "op")?;
        let left = parse_expr(v.get("left").ok_or_else(|| EvalError::Decode {
            message: format!("'{}' missing 'left'", op),
        })?)?;
        let right = parse_expr(v.get("right").ok_or_else(|| EvalError::Decode {
            message: format!("'{}' missing 'right'", op),
        })?)?;
        return Ok(Expr::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }

    Err(EvalError::Decode {
        message: format!("unrecognized expression node: {}", v),
    })
}

fn parse_case(v: &serde_json::Value) -> Result<Expr, EvalError> {
    let subject = match v.get("subject") {
        Some(s) => Some(Box::new(parse_expr(s)?)),
        None => None,
    };
    let clause_nodes = v
        .get("clauses")
        .and_then(|c| c.as_array())
        .ok_or_else(|| EvalError::Decode {
            message: "case missing 'clauses' array".to_string(),
        })?;

    let mut clauses = Vec::with_capacity(clause_nodes.len());
    for node in clause_nodes {
        let then = parse_expr(node.get("then").ok_or_else(|| EvalError::Decode {
            message: "case clause missing 'then'".to_string(),
        })?)?;
        let cond = match (node.get("when"), node.get("match"), &subject) {
            (Some(pred), None, None) => CaseCond::When(parse_pred(pred)?),
            (None, Some(expr), Some(_)) => CaseCond::Match(parse_expr(expr)?),
            (Some(_), None, Some(_)) => {
                return Err(EvalError::Decode {
                    message: "case with a subject requires 'match' clauses".to_string(),
                })
            }
            (None, Some(_), None) => {
                return Err(EvalError::Decode {
                    message: "case without a subject requires 'when' clauses".to_string(),
                })
            }
            _ => {
                return Err(EvalError::Decode {
                    message: "case clause needs exactly one of 'when' or 'match'".to_string(),
                })
            }
        };
        clauses.push(CaseClause { cond, then });
    }

    let fallback = match v.get("else") {
        Some(e) => Some(Box::new(parse_expr(e)?)),
        None => None,
    };

    Ok(Expr::Case {
        subject,
        clauses,
        fallback,
    })
}

/// Parse a predicate node.
pub fn parse_pred(v: &serde_json::Value) -> Result<Pred, EvalError> {
    if v.as_bool() == Some(true) {
        return Ok(Pred::True);
    }

    if let Some(needle) = v.get("in") {
        let list = v
            .get("list")
            .and_then(|l| l.as_array())
            .ok_or_else(|| EvalError::Decode {
                message: "'in' missing 'list' array".to_string(),
            })?
            .iter()
            .map(parse_expr)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Pred::In {
            needle: Box::new(parse_expr(needle)?),
            list,
        });
    }

    if v.get("call").is_some() {
        let name = get_str(v, "call")?;
        let args = match v.get("args").and_then(|a| a.as_array()) {
            Some(arr) => arr.iter().map(parse_expr).collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        return Ok(Pred::Call { name, args });
    }

    if v.get("op").is_some() {
        let op = get_str(v, "op")?;
        match op.as_str() {
            "and" | "or" => {
                let left = parse_pred(v.get("left").ok_or_else(|| EvalError::Decode {
                    message: format!("'{}' missing 'left'", op),
                })?)?;
                let right = parse_pred(v.get("right").ok_or_else(|| EvalError::Decode {
                    message: format!("'{}' missing 'right'", op),
                })?)?;
                return Ok(if op == "and" {
                    Pred::And(Box::new(left), Box::new(right))
                } else {
                    Pred::Or(Box::new(left), Box::new(right))
                });
            }
            "not" => {
                let operand = parse_expr(v.get("operand").ok_or_else(|| EvalError::Decode {
                    message: "'not' missing 'operand'".to_string(),
                })?)?;
                return Ok(Pred::Not(Box::new(operand)));
            }
            "=" | "!=" | "<>" | "<" | ">" | "<=" | ">=" | "=~" => {
                let left = parse_expr(v.get("left").ok_or_else(|| EvalError::Decode {
                    message: format!("'{}' missing 'left'", op),
                })?)?;
                let right = parse_expr(v.get("right").ok_or_else(|| EvalError::Decode {
                    message: format!("'{}' missing 'right'", op),
                })?)?;
                return Ok(Pred::Cmp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            other => {
                return Err(EvalError::Decode {
                    message: format!("unknown predicate operator: {}", other),
                })
            }
        }
    }

    Err(EvalError::Decode {
        message: format!("unrecognized predicate node: {}", v),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
