//! Non-reentrancy guard for runners.

use crate::errors::StagerunError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "is running" flag of a runner.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Creates a cleared flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a guard is held.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sets the flag and returns a guard that clears it on drop.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::AlreadyRunning`] if the flag is already set.
    pub fn acquire(&self, runner: &str) -> Result<RunGuard, StagerunError> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| StagerunError::already_running(runner))?;
        Ok(RunGuard {
            flag: Some(self.0.clone()),
        })
    }
}

/// Guard that clears the run flag when dropped.
///
/// The flag is released on every exit path of a run, including panics
/// that unwind through the run loop.
#[derive(Debug)]
pub struct RunGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl RunGuard {
    /// Clears the flag now instead of at drop.
    pub fn release(mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.clear();
    }
}
