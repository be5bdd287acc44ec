//! The four runners.
//!
//! - [`GroupedActionRunner`]: sequence-grouped async actions, no failure policy
//! - [`StagedOperation`]: priority-grouped steps with lifecycle events
//! - [`PipelineRunner`]: one typed value threaded through a chain of steps
//! - [`WeightedRunner`]: a pipeline that reports weighted progress

mod grouped;
mod pipeline;
mod staged;
mod weighted;

#[cfg(test)]
mod integration_tests;

pub use grouped::{ActionFuture, GroupedActionRunner, GroupedRunSummary, SequencedAction};
pub use pipeline::{PipelineHooks, PipelineRunner, PipelineStep, StateFuture};
pub use staged::{OperationReport, StagedOperation};
pub use weighted::{StepInfo, WeightedRunner};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::warn;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}

/// Invokes a caller-supplied hook, logging and suppressing panics.
pub(crate) fn call_hook<F: FnOnce()>(hook: &str, f: F) {
    if let Err(e) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(hook, "Hook panicked: {}", panic_message(e.as_ref()));
    }
}
