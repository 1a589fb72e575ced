//! Rule evaluation runtime for the sieve broker rule engine.
//!
//! The runtime accepts a stream of input documents (broker events as
//! nested key/value maps) and applies compiled rules to each: a SELECT
//! projection, a WHERE predicate, an optional FOREACH iteration with
//! per-item INCASE filtering and DOEACH transformation, and an ordered
//! list of action bindings invoked on match.
//!
//! Rules are compiled elsewhere; they reach this crate either as
//! in-memory [`Rule`] values or through the interchange JSON loader.
//! The host supplies the collaborators behind the four seams --
//! function library, topic matcher, metrics sink, action registry --
//! and drives [`Engine::apply_rules`] once per input.

pub mod actions;
pub mod cache;
pub mod coerce;
pub mod document;
pub mod expr;
pub mod interchange;
pub mod library;
pub mod metrics;
pub mod predicate;
pub mod project;
pub mod runtime;
pub mod topic;
pub mod types;

pub use actions::{ActionHandler, ActionRegistry, StaticRegistry};
pub use cache::clear_rule_payload;
pub use interchange::{parse_rules, value_from_json, value_to_json};
pub use library::{BuiltinLibrary, FnOutcome, FunctionLibrary};
pub use metrics::{CounterSink, MetricsSink, NullSink};
pub use runtime::{Engine, RuleOutcome};
pub use topic::{FilterMatcher, TopicMatcher};
pub use types::{EvalError, Expr, FieldEntry, ForeachClause, Pred, Rule, Value};

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────
