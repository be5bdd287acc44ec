//! # Stagerun
//!
//! Staged execution of discrete steps with priority grouping, progress
//! reporting, cooperative cancellation and composable results.
//!
//! Stagerun provides four runners built on the same primitives:
//!
//! - **Grouped actions**: sequence-tagged async actions, groups in order, members concurrently
//! - **Staged operation**: prioritized steps with lifecycle events and a failure policy
//! - **Pipeline**: one typed value threaded through a chain of fallible steps
//! - **Weighted runner**: a pipeline that reports weight-normalized progress
//!
//! Step failures never escape a run as errors. They are folded into an
//! [`Outcome`](core::Outcome) whose ordered error list is the single source
//! of truth for what went wrong. Only precondition violations (a second
//! concurrent run, a disposed operation) are returned as [`StagerunError`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagerun::prelude::*;
//!
//! let operation = StagedOperation::new("import")
//!     .with_step(Step::new(|_ctx| async { fetch().await }).with_priority(1))
//!     .with_step(Step::new(|_ctx| async { index().await }).with_priority(1))
//!     .with_step(Step::new(|_ctx| async { publish().await }).with_priority(2));
//!
//! operation.subscribe(|event| println!("{}", event.event_type()));
//! let outcome = operation.run().await?;
//!
//! let total = PipelineRunner::new("sum")
//!     .start_with(5)
//!     .then(|x| x + 5)
//!     .then(|x| x + 5)
//!     .run(&CancellationToken::shared())
//!     .await?;
//! assert_eq!(total.into_value(), 15);
//! ```
//!
//! [`StagerunError`]: errors::StagerunError

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod progress;
pub mod runner;
pub mod step;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::RunnerConfig;
    pub use crate::core::{codes, ErrorEntry, EventChannel, EventKind, OperationEvent, Outcome, RunState};
    pub use crate::errors::StagerunError;
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::progress::{
        CollectingProgressReporter, LoggingProgressReporter, NoOpProgressReporter,
        ProgressReporter, ProgressSnapshot, SubProgressReporter,
    };
    pub use crate::runner::{
        GroupedActionRunner, OperationReport, PipelineRunner, PipelineStep, SequencedAction,
        StagedOperation, StepInfo, WeightedRunner,
    };
    pub use crate::step::{Step, StepContext, SubOperation};
}
