//! Progress reporting.
//!
//! Runners describe progress as [`ProgressSnapshot`] values and hand them to
//! a [`ProgressReporter`]. Nothing here knows how progress is displayed.

mod reporter;
mod snapshot;

pub use reporter::{
    CollectingProgressReporter, FnProgressReporter, LoggingProgressReporter,
    NoOpProgressReporter, ProgressReporter, SubProgressReporter,
};
pub use snapshot::ProgressSnapshot;

#[cfg(test)]
pub use reporter::MockProgressReporter;
