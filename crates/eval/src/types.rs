//! Runtime value types, rule representation, and the evaluation error set.
//!
//! These types are what the runtime operates on -- rules arrive already
//! compiled (the SQL front-end lives elsewhere), and inputs are nested
//! key/value documents. Everything here is deliberately decoupled from
//! the wire format; see `interchange` for the JSON loading layer.

use std::collections::BTreeMap;
use std::fmt;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors that can occur while evaluating rules against an input.
///
/// The first four variants are the per-stage kinds the rule driver
/// recovers from (one bad rule never stops its siblings); the rest
/// surface through the driver's catch-all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Projection of the SELECT field list failed.
    SelectAndTransform { reason: String },
    /// Projection of the FOREACH collect list failed.
    SelectAndCollect { reason: String },
    /// The WHERE predicate could not be evaluated.
    MatchConditions { reason: String },
    /// The INCASE predicate could not be evaluated for a FOREACH item.
    MatchIncase { reason: String },
    /// The DOEACH projection failed for a FOREACH item.
    Doeach { reason: String },
    /// An action applier failed or could not be resolved.
    TakeActionFailed { action_id: String, reason: String },
    /// A textual value could not be read as a number.
    Coercion { input: String },
    /// The function library has no function under this name.
    UnknownFunction { name: String },
    /// The action registry has no action under this id.
    UnknownAction { action_id: String },
    /// An operator string on an AST node is not recognized.
    InvalidOperator { op: String },
    /// Generic evaluation failure (bad arity, underivable key, ...).
    Eval { message: String },
    /// Error deserializing a rule from interchange JSON.
    Decode { message: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::SelectAndTransform { reason } => {
                write!(f, "select_and_transform_error: {}", reason)
            }
            EvalError::SelectAndCollect { reason } => {
                write!(f, "select_and_collect_error: {}", reason)
            }
            EvalError::MatchConditions { reason } => {
                write!(f, "match_conditions_error: {}", reason)
            }
            EvalError::MatchIncase { reason } => {
                write!(f, "match_incase_error: {}", reason)
            }
            EvalError::Doeach { reason } => {
                write!(f, "doeach_error: {}", reason)
            }
            EvalError::TakeActionFailed { action_id, reason } => {
                write!(f, "action '{}' failed: {}", action_id, reason)
            }
            EvalError::Coercion { input } => {
                write!(f, "cannot coerce '{}' to a number", input)
            }
            EvalError::UnknownFunction { name } => {
                write!(f, "unknown function: {}", name)
            }
            EvalError::UnknownAction { action_id } => {
                write!(f, "unknown action: {}", action_id)
            }
            EvalError::InvalidOperator { op } => {
                write!(f, "invalid operator: {}", op)
            }
            EvalError::Eval { message } => {
                write!(f, "evaluation error: {}", message)
            }
            EvalError::Decode { message } => {
                write!(f, "decode error: {}", message)
            }
        }
    }
}

impl std::error::Error for EvalError {}

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A value inside an input or projected document.
///
/// `Atom` is a first-class symbolic tag, distinct from `Text`; the
/// distinction is observable in comparisons and its textual rendering
/// is an explicit coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Atom(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Atom(_) => "atom",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Extracts a boolean; `None` for every other variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value, when it has one.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Value equality as rule authors see it: `Int` and `Float` compare
    /// numerically, every other cross-variant pair is unequal.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(l), Value::Float(r)) => (*l as f64) == *r,
            (Value::Float(l), Value::Int(r)) => *l == (*r as f64),
            _ => self == other,
        }
    }

    /// Convenience constructor for an empty map value.
    pub fn map() -> Value {
        Value::Map(BTreeMap::new())
    }
}

// ──────────────────────────────────────────────
// Expression and predicate trees
// ──────────────────────────────────────────────

/// Expression nodes. Operator strings on `Arith` are validated at
/// evaluation time; an unrecognized one yields `InvalidOperator`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Read a nested path from the current document.
    Var(Vec<String>),
    /// A literal.
    Const(Value),
    /// Arithmetic, dispatched through the function library under the
    /// operator's own name.
    Arith {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// CASE with or without a subject. Without one, each clause carries
    /// a predicate; with one, each clause carries an expression matched
    /// against the subject by value equality.
    Case {
        subject: Option<Box<Expr>>,
        clauses: Vec<CaseClause>,
        fallback: Option<Box<Expr>>,
    },
    /// A function call into the library. The library may answer with a
    /// plain value or with a unary closure over the current document.
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub cond: CaseCond,
    pub then: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseCond {
    /// Subject-less form: the clause fires when the predicate matches.
    When(Pred),
    /// Subject form: the clause fires when this expression's value
    /// equals the subject's.
    Match(Expr),
}

/// Predicate nodes. `True` stands in for an absent WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Pred {
    And(Box<Pred>, Box<Pred>),
    Or(Box<Pred>, Box<Pred>),
    /// Negation of an expression. Only a strictly boolean operand
    /// participates; anything else makes the whole node false.
    Not(Box<Expr>),
    /// Membership by value equality.
    In { needle: Box<Expr>, list: Vec<Expr> },
    /// A function call used as a boolean. Non-boolean results are false.
    Call { name: String, args: Vec<Expr> },
    /// Comparison; `=~` delegates to the topic matcher.
    Cmp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    True,
}

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

/// One entry of a SELECT / FOREACH / DOEACH field list.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEntry {
    /// `*` -- project the whole current input.
    Wildcard,
    /// A bare expression; the output key is derived from its shape.
    Bare(Expr),
    /// `expression AS alias` -- the alias is visible to later entries
    /// in the same list.
    Aliased { expr: Expr, alias: String },
}

/// The FOREACH half of a rule: a collection-producing field list, a
/// per-item predicate, and a per-item projection (empty means "keep the
/// item as-is").
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachClause {
    pub collect: Vec<FieldEntry>,
    pub incase: Pred,
    pub doeach: Vec<FieldEntry>,
}

/// A compiled rule. `foreach` being `Some` is what makes a rule a
/// FOREACH rule; there is no separate flag to fall out of sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub enabled: bool,
    pub fields: Vec<FieldEntry>,
    pub conditions: Pred,
    pub actions: Vec<String>,
    pub foreach: Option<ForeachClause>,
}

impl Rule {
    pub fn is_foreach(&self) -> bool {
        self.foreach.is_some()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Atom("a".to_string()).type_name(), "atom");
        assert_eq!(Value::map().type_name(), "map");
    }

    #[test]
    fn atom_is_not_text() {
        assert_ne!(
            Value::Atom("on".to_string()),
            Value::Text("on".to_string())
        );
        assert!(!Value::Atom("on".to_string()).loosely_eq(&Value::Text("on".to_string())));
    }

    #[test]
    fn loose_equality_bridges_int_and_float() {
        assert!(Value::Int(5).loosely_eq(&Value::Float(5.0)));
        assert!(Value::Float(2.0).loosely_eq(&Value::Int(2)));
        assert!(!Value::Int(5).loosely_eq(&Value::Float(5.5)));
        assert!(!Value::Int(5).loosely_eq(&Value::Text("5".to_string())));
    }

    #[test]
    fn as_bool_is_strict() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(1).as_bool(), None);
        assert_eq!(Value::Text("true".to_string()).as_bool(), None);
    }

    #[test]
    fn foreach_flag_derives_from_clause() {
        let mut rule = Rule {
            id: "r".to_string(),
            enabled: true,
            fields: vec![FieldEntry::Wildcard],
            conditions: Pred::True,
            actions: vec![],
            foreach: None,
        };
        assert!(!rule.is_foreach());
        rule.foreach = Some(ForeachClause {
            collect: vec![FieldEntry::Wildcard],
            incase: Pred::True,
            doeach: vec![],
        });
        assert!(rule.is_foreach());
    }

    #[test]
    fn error_display_carries_stage_names() {
        let e = EvalError::SelectAndTransform {
            reason: "boom".to_string(),
        };
        assert_eq!(e.to_string(), "select_and_transform_error: boom");
        let e = EvalError::TakeActionFailed {
            action_id: "console".to_string(),
            reason: "down".to_string(),
        };
        assert_eq!(e.to_string(), "action 'console' failed: down");
    }
}
