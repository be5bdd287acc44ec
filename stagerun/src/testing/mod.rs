//! Testing utilities for runners and steps.
//!
//! This module provides:
//! - A start/finish journal with ready-made recording steps
//! - Assertions for run outcomes

mod assertions;
mod recording;

pub use assertions::{
    assert_error_codes, assert_outcome_canceled, assert_outcome_failed,
    assert_outcome_succeeded,
};
pub use recording::{LogEntry, RecordingLog};
