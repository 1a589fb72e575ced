//! The rule driver: applies a rule list to one input with per-rule
//! failure isolation.
//!
//! Rules fire in list order, actions within a rule fire in binding
//! order, and FOREACH items fire in source-list order. A rule that
//! fails in one of its projection or matching stages is logged and
//! skipped; the rest of the list still runs. The per-input payload
//! cache is released on every exit path.

use std::sync::Arc;

use tracing::{error, warn};

use crate::actions::{take_actions, ActionRegistry, StaticRegistry};
use crate::cache::PayloadGuard;
use crate::document::{merge, put_path};
use crate::library::{BuiltinLibrary, FunctionLibrary};
use crate::metrics::{MetricsSink, NullSink, RULES_MATCHED};
use crate::predicate::match_pred;
use crate::project::{select_and_collect, select_and_transform};
use crate::topic::{FilterMatcher, TopicMatcher};
use crate::types::{EvalError, ForeachClause, Rule, Value};

/// What a single rule did with an input.
#[derive(Debug, PartialEq)]
pub enum RuleOutcome {
    /// The rule matched; one return value per action invocation.
    Matched(Vec<Value>),
    /// The predicate did not match (or FOREACH produced no items).
    NoMatch,
}

/// The evaluation engine: the four collaborator seams bundled together.
///
/// An `Engine` is cheap to clone and safe to share; the only mutable
/// state the runtime owns is the per-input payload cache, which lives
/// in thread-local storage, not here.
#[derive(Clone)]
pub struct Engine {
    pub(crate) funcs: Arc<dyn FunctionLibrary>,
    pub(crate) topics: Arc<dyn TopicMatcher>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) actions: Arc<dyn ActionRegistry>,
}

impl Engine {
    pub fn new(
        funcs: Arc<dyn FunctionLibrary>,
        topics: Arc<dyn TopicMatcher>,
        metrics: Arc<dyn MetricsSink>,
        actions: Arc<dyn ActionRegistry>,
    ) -> Self {
        Self {
            funcs,
            topics,
            metrics,
            actions,
        }
    }

    /// An engine wired to the builtin library and filter matcher, with
    /// metrics discarded and no actions registered.
    pub fn builtin() -> Self {
        Self::new(
            Arc::new(BuiltinLibrary),
            Arc::new(FilterMatcher),
            Arc::new(NullSink),
            Arc::new(StaticRegistry::new()),
        )
    }

    pub fn with_functions(mut self, funcs: Arc<dyn FunctionLibrary>) -> Self {
        self.funcs = funcs;
        self
    }

    pub fn with_topics(mut self, topics: Arc<dyn TopicMatcher>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_actions(mut self, actions: Arc<dyn ActionRegistry>) -> Self {
        self.actions = actions;
        self
    }

    /// Apply every enabled rule to one input, in order. Never fails
    /// out: stage failures are logged per rule and evaluation moves on.
    pub fn apply_rules(&self, rules: &[Rule], input: &Value) {
        let _guard = PayloadGuard;
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            match self.apply_rule(rule, input) {
                Ok(_) => {}
                Err(
                    e @ (EvalError::SelectAndTransform { .. }
                    | EvalError::SelectAndCollect { .. }
                    | EvalError::MatchConditions { .. }
                    | EvalError::MatchIncase { .. }),
                ) => {
                    warn!(rule = %rule.id, "rule evaluation failed: {}", e);
                }
                Err(e) => {
                    error!(rule = %rule.id, "rule evaluation failed: {:?}", e);
                }
            }
        }
    }

    /// Apply one rule to one input. Exposed for hosts and tests that
    /// need the outcome and the raw error kinds; callers driving whole
    /// rule lists want `apply_rules`, and are responsible for
    /// `clear_rule_payload` when calling this directly.
    pub fn apply_rule(&self, rule: &Rule, input: &Value) -> Result<RuleOutcome, EvalError> {
        match &rule.foreach {
            None => self.apply_select_rule(rule, input),
            Some(foreach) => self.apply_foreach_rule(rule, foreach, input),
        }
    }

    fn apply_select_rule(&self, rule: &Rule, input: &Value) -> Result<RuleOutcome, EvalError> {
        let selected = select_and_transform(&rule.fields, input, self).map_err(|e| {
            EvalError::SelectAndTransform {
                reason: e.to_string(),
            }
        })?;
        let columns = merge(input, &selected);
        let matched = match_pred(&rule.conditions, &columns, self).map_err(|e| {
            EvalError::MatchConditions {
                reason: e.to_string(),
            }
        })?;
        if !matched {
            return Ok(RuleOutcome::NoMatch);
        }
        self.metrics.inc(&rule.id, RULES_MATCHED);
        let results = take_actions(&rule.actions, &selected, input, self)?;
        Ok(RuleOutcome::Matched(results))
    }

    fn apply_foreach_rule(
        &self,
        rule: &Rule,
        foreach: &ForeachClause,
        input: &Value,
    ) -> Result<RuleOutcome, EvalError> {
        let (selected, (binding, items)) = select_and_collect(&foreach.collect, input, self)
            .map_err(|e| EvalError::SelectAndCollect {
                reason: e.to_string(),
            })?;
        let columns = merge(input, &selected);
        let matched = match_pred(&rule.conditions, &columns, self).map_err(|e| {
            EvalError::MatchConditions {
                reason: e.to_string(),
            }
        })?;
        if !matched || items.is_empty() {
            return Ok(RuleOutcome::NoMatch);
        }
        self.metrics.inc(&rule.id, RULES_MATCHED);

        let binding_path = [binding];
        let mut results = Vec::new();
        for item in items {
            let item_columns = put_path(&binding_path, item.clone(), input);
            let keep = match_pred(&foreach.incase, &item_columns, self).map_err(|e| {
                EvalError::MatchIncase {
                    reason: e.to_string(),
                }
            })?;
            if !keep {
                continue;
            }
            let projected = if foreach.doeach.is_empty() {
                item
            } else {
                select_and_transform(&foreach.doeach, &item_columns, self).map_err(|e| {
                    EvalError::Doeach {
                        reason: e.to_string(),
                    }
                })?
            };
            results.extend(take_actions(&rule.actions, &projected, input, self)?);
        }
        Ok(RuleOutcome::Matched(results))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionHandler;
    use crate::metrics::{CounterSink, ACTIONS_FAILURE, ACTIONS_SUCCESS};
    use crate::types::{Expr, FieldEntry, Pred};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<Value>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ActionHandler for Recorder {
        fn apply(&self, selected: &Value, _input: &Value) -> Result<Value, String> {
            self.calls.lock().unwrap().push(selected.clone());
            Ok(Value::Null)
        }
    }

    struct Failing;

    impl ActionHandler for Failing {
        fn apply(&self, _selected: &Value, _input: &Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
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

    fn engine_with(recorder: &Arc<Recorder>, metrics: &Arc<CounterSink>) -> Engine {
        Engine::builtin()
            .with_actions(Arc::new(
                StaticRegistry::new().register("rec", Arc::clone(recorder) as Arc<dyn ActionHandler>),
            ))
            .with_metrics(Arc::clone(metrics) as Arc<dyn MetricsSink>)
    }

    fn select_rule(id: &str, conditions: Pred) -> Rule {
        Rule {
            id: id.to_string(),
            enabled: true,
            fields: vec![FieldEntry::Aliased {
                expr: var("a"),
                alias: "v".to_string(),
            }],
            conditions,
            actions: vec!["rec".to_string()],
            foreach: None,
        }
    }

    #[test]
    fn matching_rule_projects_and_dispatches() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = select_rule(
            "r1",
            Pred::Cmp {
                op: ">".to_string(),
                left: Box::new(var("v")),
                right: Box::new(Expr::Const(Value::Int(2))),
            },
        );
        let input = doc(&[("a", Value::Int(3)), ("b", Value::Text("x".to_string()))]);

        let outcome = engine.apply_rule(&rule, &input).unwrap();
        assert_eq!(outcome, RuleOutcome::Matched(vec![Value::Null]));
        assert_eq!(
            recorder.calls.lock().unwrap()[0],
            doc(&[("v", Value::Int(3))])
        );
        assert_eq!(metrics.count("r1", RULES_MATCHED), 1);
        assert_eq!(metrics.count("rec", ACTIONS_SUCCESS), 1);
    }

    #[test]
    fn predicate_sees_aliases_and_the_original_input() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        // Condition reads `b`, which is only in the input, not selected.
        let rule = select_rule(
            "r1",
            Pred::Cmp {
                op: "=".to_string(),
                left: Box::new(var("b")),
                right: Box::new(Expr::Const(Value::Text("x".to_string()))),
            },
        );
        let input = doc(&[("a", Value::Int(1)), ("b", Value::Text("x".to_string()))]);
        assert!(matches!(
            engine.apply_rule(&rule, &input).unwrap(),
            RuleOutcome::Matched(_)
        ));
    }

    #[test]
    fn non_matching_rule_reports_nomatch() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = select_rule(
            "r1",
            Pred::Cmp {
                op: ">".to_string(),
                left: Box::new(var("v")),
                right: Box::new(Expr::Const(Value::Int(99))),
            },
        );
        let input = doc(&[("a", Value::Int(3))]);
        assert_eq!(engine.apply_rule(&rule, &input).unwrap(), RuleOutcome::NoMatch);
        assert!(recorder.calls.lock().unwrap().is_empty());
        assert_eq!(metrics.count("r1", RULES_MATCHED), 0);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let mut rule = select_rule("r1", Pred::True);
        rule.enabled = false;
        engine.apply_rules(&[rule], &doc(&[("a", Value::Int(1))]));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn foreach_filters_and_projects_per_item() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = Rule {
            id: "fe".to_string(),
            enabled: true,
            fields: vec![],
            conditions: Pred::True,
            actions: vec!["rec".to_string()],
            foreach: Some(ForeachClause {
                collect: vec![FieldEntry::Aliased {
                    expr: var("xs"),
                    alias: "item".to_string(),
                }],
                incase: Pred::Cmp {
                    op: ">=".to_string(),
                    left: Box::new(var("item")),
                    right: Box::new(Expr::Const(Value::Int(3))),
                },
                doeach: vec![FieldEntry::Aliased {
                    expr: var("item"),
                    alias: "y".to_string(),
                }],
            }),
        };
        let input = doc(&[(
            "xs",
            Value::List(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Int(4),
            ]),
        )]);

        let outcome = engine.apply_rule(&rule, &input).unwrap();
        assert!(matches!(outcome, RuleOutcome::Matched(_)));
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![doc(&[("y", Value::Int(3))]), doc(&[("y", Value::Int(4))])]
        );
        assert_eq!(metrics.count("fe", RULES_MATCHED), 1);
        assert_eq!(metrics.count("rec", ACTIONS_SUCCESS), 2);
    }

    #[test]
    fn foreach_empty_doeach_keeps_items_as_is() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = Rule {
            id: "fe".to_string(),
            enabled: true,
            fields: vec![],
            conditions: Pred::True,
            actions: vec!["rec".to_string()],
            foreach: Some(ForeachClause {
                collect: vec![FieldEntry::Bare(var("xs"))],
                incase: Pred::True,
                doeach: vec![],
            }),
        };
        let input = doc(&[("xs", Value::List(vec![Value::Int(7)]))]);
        engine.apply_rule(&rule, &input).unwrap();
        assert_eq!(*recorder.calls.lock().unwrap(), vec![Value::Int(7)]);
    }

    #[test]
    fn foreach_over_a_non_list_never_matches() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = Rule {
            id: "fe".to_string(),
            enabled: true,
            fields: vec![],
            conditions: Pred::True,
            actions: vec!["rec".to_string()],
            foreach: Some(ForeachClause {
                collect: vec![FieldEntry::Bare(var("xs"))],
                incase: Pred::True,
                doeach: vec![],
            }),
        };
        let input = doc(&[("xs", Value::Text("not a list".to_string()))]);
        assert_eq!(engine.apply_rule(&rule, &input).unwrap(), RuleOutcome::NoMatch);
        assert!(recorder.calls.lock().unwrap().is_empty());
        assert_eq!(metrics.count("fe", RULES_MATCHED), 0);
    }

    #[test]
    fn bad_rule_does_not_stop_its_siblings() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        // Comparing an int against unparseable text fails the predicate
        // stage of the first rule.
        let bad = select_rule(
            "bad",
            Pred::Cmp {
                op: "=".to_string(),
                left: Box::new(var("a")),
                right: Box::new(Expr::Const(Value::Text("not a number".to_string()))),
            },
        );
        let good = select_rule("good", Pred::True);
        engine.apply_rules(&[bad, good], &doc(&[("a", Value::Int(1))]));
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        assert_eq!(metrics.count("good", RULES_MATCHED), 1);
        assert_eq!(metrics.count("bad", RULES_MATCHED), 0);
    }

    #[test]
    fn failing_action_does_not_stop_sibling_rules() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = Engine::builtin()
            .with_actions(Arc::new(
                StaticRegistry::new()
                    .register("boom", Arc::new(Failing))
                    .register("rec", Arc::clone(&recorder) as Arc<dyn ActionHandler>),
            ))
            .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>);

        let mut first = select_rule("a", Pred::True);
        first.actions = vec!["boom".to_string()];
        let second = select_rule("b", Pred::True);

        engine.apply_rules(&[first, second], &doc(&[("a", Value::Int(1))]));
        assert_eq!(metrics.count("boom", ACTIONS_FAILURE), 1);
        assert_eq!(metrics.count("rec", ACTIONS_SUCCESS), 1);
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn payload_cache_is_cleared_between_inputs() {
        let recorder = Recorder::new();
        let metrics = Arc::new(CounterSink::new());
        let engine = engine_with(&recorder, &metrics);
        let rule = Rule {
            id: "p".to_string(),
            enabled: true,
            fields: vec![FieldEntry::Aliased {
                expr: var("payload.k"),
                alias: "v".to_string(),
            }],
            conditions: Pred::True,
            actions: vec!["rec".to_string()],
            foreach: None,
        };
        let first = doc(&[("payload", Value::Text("{\"k\":1}".to_string()))]);
        let second = doc(&[("payload", Value::Text("{\"k\":2}".to_string()))]);

        engine.apply_rules(std::slice::from_ref(&rule), &first);
        engine.apply_rules(std::slice::from_ref(&rule), &second);

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0], doc(&[("v", Value::Int(1))]));
        assert_eq!(calls[1], doc(&[("v", Value::Int(2))]));
    }
}
