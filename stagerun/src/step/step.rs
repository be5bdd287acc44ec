//! The unit of work scheduled by a staged operation.

use super::context::StepContext;
use super::group::Sequenced;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

/// Boxed future returned by a step body.
pub type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Shared, re-invocable step body.
pub type StepAction = Arc<dyn Fn(StepContext) -> StepFuture + Send + Sync>;

/// A described, optionally prioritized unit of work.
///
/// Steps with the same priority run concurrently; groups run in ascending
/// priority order. A step without a priority lands in the "no priority"
/// group, which runs before every explicit priority. When no step has a
/// priority at all, steps run one at a time in the order they were added.
#[derive(Clone)]
pub struct Step {
    action: StepAction,
    description: Option<String>,
    priority: Option<i32>,
    enabled: bool,
}

impl Step {
    /// Creates a step from an async body.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            action: Arc::new(move |ctx: StepContext| action(ctx).boxed()),
            description: None,
            priority: None,
            enabled: true,
        }
    }

    /// Creates a step from a synchronous body.
    pub fn from_fn<F>(action: F) -> Self
    where
        F: Fn(&StepContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        Self::new(move |ctx: StepContext| {
            let action = Arc::clone(&action);
            async move { action(&ctx) }
        })
    }

    /// Creates a step whose body receives a fixed argument on every run.
    pub fn with_argument<A, F, Fut>(argument: A, action: F) -> Self
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(StepContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(move |ctx: StepContext| action(ctx, argument.clone()))
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Enables or disables the step.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Disables the step; disabled steps are never launched.
    #[must_use]
    pub fn disabled(self) -> Self {
        self.with_enabled(false)
    }

    /// The step's description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The step's priority.
    #[must_use]
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Whether the step will be launched.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// A label for logs: the description, or the position.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("step #{index}"))
    }

    /// Invokes the body.
    pub fn invoke(&self, ctx: StepContext) -> StepFuture {
        (self.action)(ctx)
    }
}

impl Sequenced for Step {
    fn sequence(&self) -> Option<i32> {
        self.priority
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("description", &self.description)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
