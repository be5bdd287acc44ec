//! Observability utilities.

mod subscriber;
mod timer;

pub use subscriber::{init_tracing, init_tracing_with_filter, LogFormat};
pub use timer::StepTimer;
