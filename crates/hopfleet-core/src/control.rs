//! Batch control for cancellation: a shared abort token checked between steps.
//!
//! The scheduler hands the same token to the connector, the output collector
//! and every transfer. Setting it stops work at the next check point; open
//! sessions are still closed so their hosts go back to the inventory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error returned when a batch is stopped through its abort token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

impl std::fmt::Display for Aborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch aborted")
    }
}

impl std::error::Error for Aborted {}

/// Cloneable abort flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abort. Work in flight stops at its next check point.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Aborted)` once abort was requested.
    pub fn check(&self) -> Result<(), Aborted> {
        if self.is_aborted() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }
}
