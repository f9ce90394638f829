//! Cooperative cancellation flag shared between a pipeline and its workers
//!
//! Workers poll [`CancellationToken::is_cancelled`] between units of work (one
//! item at a time); an in-flight load is never interrupted. The owning pipeline
//! cancels, joins its threads, and only then resets the token for the next run,
//! so a reset can never be observed by a worker of the previous run.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared, thread-safe cancellation flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Return to the non-cancelled state; all clones are reset too.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
