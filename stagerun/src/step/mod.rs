//! Steps, step contexts, and priority grouping.

mod context;
mod group;
#[allow(clippy::module_inception)]
mod step;

pub use context::{StepContext, SubOperation};
pub use group::{plan_groups, Sequenced, StepGroup};
pub use step::{Step, StepAction, StepFuture};
