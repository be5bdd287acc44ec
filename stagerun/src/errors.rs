//! Error types for the stagerun framework.
//!
//! Only precondition violations and configuration problems travel through
//! [`StagerunError`] as an `Err`. Step failures and cancellation are folded
//! into the [`Outcome`](crate::core::Outcome) channel by the runners;
//! [`Outcome::into_run_result`](crate::core::Outcome::into_run_result) turns
//! one back into `StepFailed` or `Cancelled`. The grouped action runner,
//! which has no outcome channel, returns `StepFailed` directly.

use thiserror::Error;

/// The main error type for stagerun operations.
#[derive(Debug, Error)]
pub enum StagerunError {
    /// A run was requested while the same runner is still operating.
    #[error("Runner '{runner}' is already running")]
    AlreadyRunning {
        /// The runner name.
        runner: String,
    },

    /// The runner has been disposed and cannot start again.
    #[error("Runner '{runner}' has been disposed")]
    Disposed {
        /// The runner name.
        runner: String,
    },

    /// A pipeline was run without a start producer.
    #[error("Pipeline '{runner}' has no start producer")]
    MissingProducer {
        /// The runner name.
        runner: String,
    },

    /// `wait` was called without a preceding `start`.
    #[error("Runner '{runner}' was never started")]
    NotStarted {
        /// The runner name.
        runner: String,
    },

    /// A step body failed.
    #[error("Step '{description}' failed: {message}")]
    StepFailed {
        /// Step description, or its position when it has none.
        description: String,
        /// The failure message.
        message: String,
    },

    /// A run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StagerunError {
    /// Creates an already-running error.
    #[must_use]
    pub fn already_running(runner: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            runner: runner.into(),
        }
    }

    /// Creates a disposed error.
    #[must_use]
    pub fn disposed(runner: impl Into<String>) -> Self {
        Self::Disposed {
            runner: runner.into(),
        }
    }

    /// Creates a step failed error.
    #[must_use]
    pub fn step_failed(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFailed {
            description: description.into(),
            message: message.into(),
        }
    }

    /// Returns true for programmer errors that are raised synchronously.
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. }
                | Self::Disposed { .. }
                | Self::MissingProducer { .. }
                | Self::NotStarted { .. }
        )
    }
}
