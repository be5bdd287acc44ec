//! Sequential pipeline runner.
//!
//! Threads one typed state value through an ordered chain of steps. Every
//! step is normalized to the shape
//! `(S, Arc<CancellationToken>) -> Future<Output = anyhow::Result<S>>`,
//! whatever form it was registered in.

use super::{call_hook, panic_message};
use crate::cancellation::{CancellationToken, RunFlag};
use crate::config::RunnerConfig;
use crate::core::{ErrorEntry, Outcome};
use crate::errors::StagerunError;
use crate::observability::StepTimer;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Boxed future returned by a pipeline step.
pub type StateFuture<S> = BoxFuture<'static, anyhow::Result<S>>;

type StepFn<S> = Arc<dyn Fn(S, Arc<CancellationToken>) -> StateFuture<S> + Send + Sync>;
type StartFn<S> = Arc<dyn Fn() -> BoxFuture<'static, S> + Send + Sync>;

/// One step of a pipeline, in canonical form.
pub struct PipelineStep<S> {
    action: StepFn<S>,
    description: Option<String>,
}

impl<S> Clone for PipelineStep<S> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
            description: self.description.clone(),
        }
    }
}

impl<S: Send + 'static> PipelineStep<S> {
    /// Canonical form: async, fallible, state in and out.
    pub fn async_try<F, Fut>(action: F) -> Self
    where
        F: Fn(S, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        Self {
            action: Arc::new(move |state: S, token: Arc<CancellationToken>| {
                action(state, token).boxed()
            }),
            description: None,
        }
    }

    /// Async infallible transformation.
    pub fn async_fn<F, Fut>(action: F) -> Self
    where
        F: Fn(S, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        Self::async_try(move |state, token| action(state, token).map(Ok))
    }

    /// Sync infallible transformation.
    pub fn sync<F>(action: F) -> Self
    where
        F: Fn(S) -> S + Send + Sync + 'static,
    {
        Self::try_sync(move |state| Ok(action(state)))
    }

    /// Sync fallible transformation.
    pub fn try_sync<F>(action: F) -> Self
    where
        F: Fn(S) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        Self::async_try(move |state, _token| {
            let action = Arc::clone(&action);
            async move { action(state) }
        })
    }

    /// Async unit step that leaves the state untouched.
    pub fn action<F, Fut>(action: F) -> Self
    where
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let action = Arc::new(action);
        Self::async_try(move |state, token| {
            let action = Arc::clone(&action);
            async move {
                action(token).await?;
                Ok(state)
            }
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The step's description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn label(&self, index: usize) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("step #{index}"))
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;
type StepHook = Box<dyn Fn(usize, Option<&str>) + Send + Sync>;
type ErrorHook = Box<dyn Fn(usize, &str) + Send + Sync>;
type CancelHook = Box<dyn Fn(&str) + Send + Sync>;
type EndHook<S> = Box<dyn Fn(&Outcome<S>) + Send + Sync>;

/// Lifecycle callbacks of a pipeline run; at most one per slot.
///
/// Hooks run synchronously on the task driving the run. A panicking hook
/// is logged and ignored.
pub struct PipelineHooks<S> {
    on_starting: Option<Hook>,
    on_stepping: Option<StepHook>,
    on_stepped: Option<StepHook>,
    on_exception_occurred: Option<ErrorHook>,
    on_cancellation_requested: Option<CancelHook>,
    on_ended: Option<EndHook<S>>,
}

impl<S> Default for PipelineHooks<S> {
    fn default() -> Self {
        Self {
            on_starting: None,
            on_stepping: None,
            on_stepped: None,
            on_exception_occurred: None,
            on_cancellation_requested: None,
            on_ended: None,
        }
    }
}

impl<S> PipelineHooks<S> {
    fn starting(&self) {
        if let Some(hook) = &self.on_starting {
            call_hook("on_starting", || hook());
        }
    }

    fn stepping(&self, index: usize, description: Option<&str>) {
        if let Some(hook) = &self.on_stepping {
            call_hook("on_stepping", || hook(index, description));
        }
    }

    fn stepped(&self, index: usize, description: Option<&str>) {
        if let Some(hook) = &self.on_stepped {
            call_hook("on_stepped", || hook(index, description));
        }
    }

    fn exception_occurred(&self, index: usize, message: &str) {
        if let Some(hook) = &self.on_exception_occurred {
            call_hook("on_exception_occurred", || hook(index, message));
        }
    }

    fn cancellation_requested(&self, reason: &str) {
        if let Some(hook) = &self.on_cancellation_requested {
            call_hook("on_cancellation_requested", || hook(reason));
        }
    }

    fn ended(&self, outcome: &Outcome<S>) {
        if let Some(hook) = &self.on_ended {
            call_hook("on_ended", || hook(outcome));
        }
    }
}

/// Runs a chain of state transformations in declared order.
///
/// A runner is reusable but not reentrant: a second [`run`](Self::run)
/// while one is in flight fails with [`StagerunError::AlreadyRunning`].
pub struct PipelineRunner<S> {
    name: String,
    start: Option<StartFn<S>>,
    steps: Vec<PipelineStep<S>>,
    hooks: PipelineHooks<S>,
    config: RunnerConfig,
    run_flag: RunFlag,
}

impl<S> PipelineRunner<S>
where
    S: Clone + Send + 'static,
{
    /// Creates a runner with no start producer and no steps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            steps: Vec::new(),
            hooks: PipelineHooks::default(),
            config: RunnerConfig::default(),
            run_flag: RunFlag::new(),
        }
    }

    /// Starts every run from a clone of `value`.
    #[must_use]
    pub fn start_with(mut self, value: S) -> Self
    where
        S: Sync,
    {
        self.start = Some(Arc::new(move || {
            let value = value.clone();
            async move { value }.boxed()
        }));
        self
    }

    /// Produces the initial state with a closure.
    #[must_use]
    pub fn start_with_fn<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.start = Some(Arc::new(move || {
            let value = producer();
            async move { value }.boxed()
        }));
        self
    }

    /// Produces the initial state asynchronously.
    #[must_use]
    pub fn start_with_async<F, Fut>(mut self, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        self.start = Some(Arc::new(move || producer().boxed()));
        self
    }

    /// Appends a step in canonical form.
    #[must_use]
    pub fn then_step(mut self, step: PipelineStep<S>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a sync transformation.
    #[must_use]
    pub fn then<F>(self, action: F) -> Self
    where
        F: Fn(S) -> S + Send + Sync + 'static,
    {
        self.then_step(PipelineStep::sync(action))
    }

    /// Appends a sync fallible transformation.
    #[must_use]
    pub fn then_try<F>(self, action: F) -> Self
    where
        F: Fn(S) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        self.then_step(PipelineStep::try_sync(action))
    }

    /// Appends an async transformation.
    #[must_use]
    pub fn then_async<F, Fut>(self, action: F) -> Self
    where
        F: Fn(S, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        self.then_step(PipelineStep::async_fn(action))
    }

    /// Appends an async fallible transformation.
    #[must_use]
    pub fn then_async_try<F, Fut>(self, action: F) -> Self
    where
        F: Fn(S, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        self.then_step(PipelineStep::async_try(action))
    }

    /// Appends an async step that does not touch the state.
    #[must_use]
    pub fn then_action<F, Fut>(self, action: F) -> Self
    where
        F: Fn(Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.then_step(PipelineStep::action(action))
    }

    /// Appends a step with a description.
    #[must_use]
    pub fn then_described(self, description: impl Into<String>, step: PipelineStep<S>) -> Self {
        self.then_step(step.with_description(description))
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the continue-on-exception policy.
    #[must_use]
    pub fn continue_on_exception(mut self, continue_on_exception: bool) -> Self {
        self.config.continue_on_exception = continue_on_exception;
        self
    }

    /// Called once before the start producer runs.
    #[must_use]
    pub fn on_starting<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks.on_starting = Some(Box::new(hook));
        self
    }

    /// Called before each step with its index and description.
    #[must_use]
    pub fn on_stepping<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, Option<&str>) + Send + Sync + 'static,
    {
        self.hooks.on_stepping = Some(Box::new(hook));
        self
    }

    /// Called after each successful step.
    #[must_use]
    pub fn on_stepped<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, Option<&str>) + Send + Sync + 'static,
    {
        self.hooks.on_stepped = Some(Box::new(hook));
        self
    }

    /// Called when a step fails or panics.
    #[must_use]
    pub fn on_exception_occurred<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &str) + Send + Sync + 'static,
    {
        self.hooks.on_exception_occurred = Some(Box::new(hook));
        self
    }

    /// Called when the run stops because the token was cancelled.
    #[must_use]
    pub fn on_cancellation_requested<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.on_cancellation_requested = Some(Box::new(hook));
        self
    }

    /// Called exactly once per run with the final outcome.
    #[must_use]
    pub fn on_ended<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Outcome<S>) + Send + Sync + 'static,
    {
        self.hooks.on_ended = Some(Box::new(hook));
        self
    }

    /// Returns the runner name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_flag.is_set()
    }

    /// Runs the pipeline.
    ///
    /// Step failures and cancellation end up in the returned [`Outcome`].
    /// On failure its value is the state as of the failure point; a failed
    /// step's transformation is never applied.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::MissingProducer`] if no start producer was
    /// configured, or [`StagerunError::AlreadyRunning`] if a run is in
    /// progress.
    pub async fn run(&self, token: &Arc<CancellationToken>) -> Result<Outcome<S>, StagerunError> {
        let start = self.start.clone().ok_or_else(|| StagerunError::MissingProducer {
            runner: self.name.clone(),
        })?;
        let guard = self.run_flag.acquire(&self.name)?;
        let run_start = Instant::now();

        info!(runner = %self.name, total = self.steps.len(), "Starting pipeline");
        self.hooks.starting();

        let mut state = start().await;
        let mut errors = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            if token.is_cancelled() {
                let reason = token
                    .reason()
                    .unwrap_or_else(|| self.config.cancel_reason.clone());
                warn!(runner = %self.name, completed = index, %reason, "Pipeline cancelled");
                self.hooks.cancellation_requested(&reason);
                errors.push(ErrorEntry::canceled(reason));
                break;
            }

            let label = step.label(index);
            self.hooks.stepping(index, step.description());
            debug!(runner = %self.name, step = %label, "Running step");

            let timer = StepTimer::start(label.as_str());
            let input = state.clone();
            let result = AssertUnwindSafe(async { (step.action)(input, Arc::clone(token)).await })
                .catch_unwind()
                .await;
            let duration_ms = timer.finish(self.config.slow_step_threshold());

            let entry = match result {
                Ok(Ok(next)) => {
                    state = next;
                    debug!(runner = %self.name, step = %label, duration_ms, "Step completed");
                    self.hooks.stepped(index, step.description());
                    continue;
                }
                Ok(Err(e)) => {
                    let message = format!("{e:#}");
                    warn!(runner = %self.name, step = %label, "Step failed: {message}");
                    ErrorEntry::step_failed(message)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(runner = %self.name, step = %label, "Step panicked: {message}");
                    ErrorEntry::panicked(message)
                }
            };

            self.hooks.exception_occurred(index, &entry.message);
            errors.push(entry);
            if !self.config.continue_on_exception {
                break;
            }
        }

        let outcome = Outcome::with_errors(state, errors);
        guard.release();

        info!(
            runner = %self.name,
            succeeded = outcome.is_succeeded(),
            errors = outcome.errors().len(),
            duration_ms = run_start.elapsed().as_secs_f64() * 1000.0,
            "Pipeline ended"
        );
        self.hooks.ended(&outcome);

        Ok(outcome)
    }
}

impl<S> std::fmt::Debug for PipelineRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("has_start", &self.start.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
