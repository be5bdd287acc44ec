//! Step timing helper.

use std::time::{Duration, Instant};
use tracing::warn;

/// Measures a single step and flags slow ones.
#[derive(Debug)]
pub struct StepTimer {
    start: Instant,
    name: String,
}

impl StepTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the timer, warning if it exceeded `threshold`.
    ///
    /// Returns the duration in milliseconds.
    pub fn finish(self, threshold: Option<Duration>) -> f64 {
        let elapsed = self.start.elapsed();
        if let Some(threshold) = threshold {
            if elapsed > threshold {
                warn!(
                    step = %self.name,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    threshold_ms = threshold.as_secs_f64() * 1000.0,
                    "Slow step"
                );
            }
        }
        elapsed.as_secs_f64() * 1000.0
    }
}
