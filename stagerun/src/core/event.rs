//! Lifecycle events emitted by a staged operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which progress track an event belongs to.
///
/// `Main` tracks the operation's own steps. `SubOperation` is driven by a
/// step that reports progress on a nested task of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    /// The main operation.
    Main,
    /// The current sub-operation of a running step.
    SubOperation,
}

impl EventChannel {
    fn prefix(self) -> &'static str {
        match self {
            Self::Main => "operation",
            Self::SubOperation => "sub_operation",
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A run (or sub-operation) is starting with `total` steps.
    Starting {
        /// Number of steps that will be attempted.
        total: usize,
    },
    /// A step is about to run. `current` is its launch index, so members
    /// of one concurrent group each get a distinct value.
    StepIncreasing {
        /// Steps launched before this one.
        current: usize,
        /// Total steps.
        total: usize,
    },
    /// A step finished successfully. `current` includes it.
    StepIncreased {
        /// Steps finished so far.
        current: usize,
        /// Total steps.
        total: usize,
    },
    /// The run ended. Always the last event of a run.
    Ended {
        /// True when no step failure was captured.
        succeeded: bool,
        /// True when cancellation was requested.
        canceled: bool,
    },
    /// Cancellation was requested.
    Canceled,
    /// A step failed.
    ErrorOccurred {
        /// The failure message.
        error: String,
    },
}

impl EventKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Starting { .. } => "starting",
            Self::StepIncreasing { .. } => "step_increasing",
            Self::StepIncreased { .. } => "step_increased",
            Self::Ended { .. } => "ended",
            Self::Canceled => "canceled",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// An event broadcast to operation subscribers and event sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// The run this event belongs to; `None` for a cancel with no run.
    pub run_id: Option<Uuid>,
    /// The progress track.
    pub channel: EventChannel,
    /// The event payload.
    #[serde(flatten)]
    pub kind: EventKind,
    /// Description of the step or sub-operation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl OperationEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(run_id: Option<Uuid>, channel: EventChannel, kind: EventKind) -> Self {
        Self {
            run_id,
            channel,
            kind,
            description: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a main-channel event.
    #[must_use]
    pub fn main(run_id: Option<Uuid>, kind: EventKind) -> Self {
        Self::new(run_id, EventChannel::Main, kind)
    }

    /// Creates a sub-operation event.
    #[must_use]
    pub fn sub_operation(run_id: Option<Uuid>, kind: EventKind) -> Self {
        Self::new(run_id, EventChannel::SubOperation, kind)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = description.map(Into::into);
        self
    }

    /// Returns the dotted event type, e.g. `operation.step_increased`.
    #[must_use]
    pub fn event_type(&self) -> String {
        format!("{}.{}", self.channel.prefix(), self.kind.name())
    }

    /// Returns true for the terminal event of a main run.
    #[must_use]
    pub fn is_main_ended(&self) -> bool {
        self.channel == EventChannel::Main && matches!(self.kind, EventKind::Ended { .. })
    }

    /// Converts the event to a JSON value for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
