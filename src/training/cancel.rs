use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{DecisionServiceError, Result};

/// Cooperative cancellation flag shared between a training run and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) was called on any clone.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DecisionServiceError::Cancelled)
        } else {
            Ok(())
        }
    }
}
