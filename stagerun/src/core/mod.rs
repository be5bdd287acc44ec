//! Core domain model types for stagerun.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The combinable [`Outcome`] value and its error entries
//! - The run state machine
//! - Lifecycle events of a staged operation

mod event;
mod result;
mod status;

pub use event::{EventChannel, EventKind, OperationEvent};
pub use result::{codes, ErrorEntry, Outcome};
pub use status::RunState;
