//! Cooperative cancellation and run guards.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - RunFlag/RunGuard enforcing that a runner has one active run at a time

mod guard;
mod token;

pub use guard::{RunFlag, RunGuard};
pub use token::CancellationToken;
