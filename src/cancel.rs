//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable cancellation handle threaded through every initialization
/// phase.
///
/// The flag is polled at the start of each phase and inside each per-item
/// task; once observed, the whole initialization unwinds and the engine
/// under construction is discarded, never retried in place. Queries on a
/// fully built engine are unaffected.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; may be called from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Poll point: `Err(Cancelled)` once the flag has been observed.
    pub(crate) fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::error::ProximaError::Cancelled)
        } else {
            Ok(())
        }
    }
}
