//! Cooperative cancellation (spec §5 "every long-running operation accepts
//! a cancellation signal and a deadline propagated from the orchestrator;
//! on cancel, in-flight batches complete their current item and stop").
//!
//! Grounded on the teacher's `DaemonState` shutdown-flag pattern
//! (`should_shutdown`/`request_shutdown` over an `AtomicBool`) rather than
//! a channel or external cancellation-token crate — the same shape, just
//! renamed and made cloneable so every stage call can carry its own handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
