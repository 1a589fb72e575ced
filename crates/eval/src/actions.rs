//! Action resolution and dispatch.
//!
//! Actions are opaque effects owned by the host; the runtime resolves
//! each bound action id through the registry and invokes it with the
//! projected mapping and the original input. Dispatch is strict: the
//! first failing action aborts the remaining actions of that rule, and
//! the driver decides whether sibling rules continue (they do).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::metrics::{ACTIONS_FAILURE, ACTIONS_SUCCESS};
use crate::runtime::Engine;
use crate::types::{EvalError, Value};

/// One applier, resolved per dispatch from the registry.
pub trait ActionHandler: Send + Sync {
    fn apply(&self, selected: &Value, input: &Value) -> Result<Value, String>;
}

impl std::fmt::Debug for dyn ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActionHandler")
    }
}

/// Resolves action ids to appliers. Must tolerate any number of
/// resolutions for the same id.
pub trait ActionRegistry: Send + Sync {
    fn action_instance(&self, action_id: &str) -> Result<Arc<dyn ActionHandler>, EvalError>;
}

/// A fixed id-to-handler table; the registry used by the CLI and the
/// test suites.
#[derive(Default)]
pub struct StaticRegistry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, id: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(id.into(), handler);
        self
    }
}

impl ActionRegistry for StaticRegistry {
    fn action_instance(&self, action_id: &str) -> Result<Arc<dyn ActionHandler>, EvalError> {
        self.handlers
            .get(action_id)
            .cloned()
            .ok_or_else(|| EvalError::UnknownAction {
                action_id: action_id.to_string(),
            })
    }
}

/// Invoke every bound action in order, collecting return values and
/// bumping the success/failure counters per action id.
pub(crate) fn take_actions(
    action_ids: &[String],
    selected: &Value,
    input: &Value,
    engine: &Engine,
) -> Result<Vec<Value>, EvalError> {
    let mut results = Vec::with_capacity(action_ids.len());
    for id in action_ids {
        let handler = match engine.actions.action_instance(id) {
            Ok(handler) => handler,
            Err(e) => {
                engine.metrics.inc(id, ACTIONS_FAILURE);
                return Err(EvalError::TakeActionFailed {
                    action_id: id.clone(),
                    reason: e.to_string(),
                });
            }
        };
        match handler.apply(selected, input) {
            Ok(value) => {
                engine.metrics.inc(id, ACTIONS_SUCCESS);
                results.push(value);
            }
            Err(reason) => {
                engine.metrics.inc(id, ACTIONS_FAILURE);
                return Err(EvalError::TakeActionFailed {
                    action_id: id.clone(),
                    reason,
                });
            }
        }
    }
    Ok(results)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
