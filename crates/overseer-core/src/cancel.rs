//! Cooperative cancellation. Long-running operations check the token between steps;
//! a cancelled call returns the `cancelled` error kind with observable state unchanged.

use crate::error::{OverseerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable flag that requests cancellation of in-flight work
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns the `cancelled` error if the token has fired
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(OverseerError::cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }
}
