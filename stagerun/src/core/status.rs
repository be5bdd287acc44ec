//! Run state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a staged operation.
///
/// `Idle -> Operating -> {Completed, Canceled, Faulted}`; a terminal state
/// may start again, which moves it back to `Operating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Never started.
    #[default]
    Idle,
    /// A run is in progress.
    Operating,
    /// The last run finished without a captured step failure.
    Completed,
    /// The last run observed a cancellation request.
    Canceled,
    /// The last run captured at least one step failure.
    Faulted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Operating => write!(f, "operating"),
            Self::Completed => write!(f, "completed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

impl RunState {
    /// Returns true if the status represents a finished run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Faulted)
    }

    /// Returns true if a new run may be started from this state.
    #[must_use]
    pub fn can_start(&self) -> bool {
        !matches!(self, Self::Operating)
    }

    /// Picks the terminal state for a finished run.
    ///
    /// Cancellation takes precedence over a captured failure.
    #[must_use]
    pub fn finished(canceled: bool, faulted: bool) -> Self {
        if canceled {
            Self::Canceled
        } else if faulted {
            Self::Faulted
        } else {
            Self::Completed
        }
    }
}
