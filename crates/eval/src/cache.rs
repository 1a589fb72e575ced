//! Per-input scratch cache for the decoded `payload` field.
//!
//! Decoding a large JSON payload on every `payload.*` read is the
//! hot-path cost of rule evaluation, so the first read within an input
//! decodes once and later reads reuse the stored mapping. The slot is
//! thread-local: one input is processed by exactly one worker, and the
//! driver clears the slot when it finishes with an input, normal exit
//! or not.

use std::cell::RefCell;

use crate::coerce::ensure_map;
use crate::document::get_path;
use crate::types::Value;

thread_local! {
    static DECODED_PAYLOAD: RefCell<Option<Value>> = const { RefCell::new(None) };
}

/// Read a subpath of the input's `payload`, decoding it on first use.
///
/// An empty subpath yields the whole decoded mapping, so a bare
/// `payload` read and a `payload.k` read stay consistent within one
/// input.
pub(crate) fn payload_field(subpath: &[String], input: &Value) -> Value {
    DECODED_PAYLOAD.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            let raw = match input {
                Value::Map(map) => map.get("payload").cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
            *slot = Some(ensure_map(&raw));
        }
        let decoded = slot.as_ref().expect("slot populated above");
        if subpath.is_empty() {
            decoded.clone()
        } else {
            get_path(subpath, decoded).cloned().unwrap_or(Value::Null)
        }
    })
}

/// Release the scratch slot. Idempotent.
pub fn clear_rule_payload() {
    DECODED_PAYLOAD.with(|slot| *slot.borrow_mut() = None);
}

/// Clears the scratch slot when dropped, so the driver releases it on
/// every exit path, panics included.
pub(crate) struct PayloadGuard;

impl Drop for PayloadGuard {
    fn drop(&mut self) {
        clear_rule_payload();
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
