//! Single-slot capture signal shared between a response observer and the waiting caller.
//!
//! The first value offered wins; later offers are ignored. A signal belongs to
//! exactly one browser session and is never reused.

use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Notify;

/// Write-once holder for "the matching response, if any".
#[derive(Debug, Default)]
pub struct CaptureSignal {
    slot: OnceLock<Value>,
    notify: Notify,
}

impl CaptureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` if nothing was captured yet. Returns whether it was accepted.
    pub fn offer(&self, value: Value) -> bool {
        let accepted = self.slot.set(value).is_ok();
        if accepted {
            self.notify.notify_waiters();
        }
        accepted
    }

    pub fn is_captured(&self) -> bool {
        self.slot.get().is_some()
    }

    /// A copy of the captured value, if any.
    pub fn get(&self) -> Option<Value> {
        self.slot.get().cloned()
    }

    /// Wait up to `timeout` for a capture.
    pub async fn wait(&self, timeout: Duration) -> Option<Value> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the slot so an offer in between is not missed.
        notified.as_mut().enable();
        if let Some(v) = self.get() {
            return Some(v);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.get()
    }
}
