//! Metrics sink seam and in-process implementations.
//!
//! The runtime bumps three counters: `rules.matched` keyed by rule id,
//! and `actions.success` / `actions.failure` keyed by action id. A sink
//! must never fail; the engine calls it from the hot path.

use std::collections::BTreeMap;
use std::sync::Mutex;

pub const RULES_MATCHED: &str = "rules.matched";
pub const ACTIONS_SUCCESS: &str = "actions.success";
pub const ACTIONS_FAILURE: &str = "actions.failure";

/// Counter sink consumed by the engine.
pub trait MetricsSink: Send + Sync {
    fn inc(&self, id: &str, counter: &str);
}

/// Discards every increment.
pub struct NullSink;

impl MetricsSink for NullSink {
    fn inc(&self, _id: &str, _counter: &str) {}
}

/// In-memory counters, readable back; the sink used by the CLI summary
/// and the test suites.
#[derive(Default)]
pub struct CounterSink {
    counts: Mutex<BTreeMap<(String, String), u64>>,
}

impl CounterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn count(&self, id: &str, counter: &str) -> u64 {
        let counts = self.counts.lock().expect("metrics mutex poisoned");
        counts
            .get(&(id.to_string(), counter.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all counters, for reporting.
    pub fn snapshot(&self) -> Vec<(String, String, u64)> {
        let counts = self.counts.lock().expect("metrics mutex poisoned");
        counts
            .iter()
            .map(|((id, counter), n)| (id.clone(), counter.clone(), *n))
            .collect()
    }
}

impl MetricsSink for CounterSink {
    fn inc(&self, id: &str, counter: &str) {
        let mut counts = self.counts.lock().expect("metrics mutex poisoned");
        *counts
            .entry((id.to_string(), counter.to_string()))
            .or_insert(0) += 1;
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
