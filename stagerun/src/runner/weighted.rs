//! Weighted multistep runner.
//!
//! Like [`PipelineRunner`](super::PipelineRunner), but each step carries a
//! progress weight. After every attempted step the runner reports
//! `(sum of weights so far, total weight)` and folds the step's outcome
//! into a running aggregate with `+=`.

use super::panic_message;
use super::pipeline::StateFuture;
use crate::cancellation::{CancellationToken, RunFlag};
use crate::config::RunnerConfig;
use crate::core::{ErrorEntry, Outcome};
use crate::errors::StagerunError;
use crate::observability::StepTimer;
use crate::progress::{NoOpProgressReporter, ProgressReporter, ProgressSnapshot, SubProgressReporter};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type WeightedFn<S> =
    Arc<dyn Fn(S, SubProgressReporter, Arc<CancellationToken>) -> StateFuture<S> + Send + Sync>;

/// A weighted step.
pub struct StepInfo<S> {
    action: WeightedFn<S>,
    description: Option<String>,
    weight: u32,
}

impl<S> Clone for StepInfo<S> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
            description: self.description.clone(),
            weight: self.weight,
        }
    }
}

impl<S: Send + 'static> StepInfo<S> {
    /// Creates a step with the given progress weight.
    pub fn new<F, Fut>(weight: u32, action: F) -> Self
    where
        F: Fn(S, SubProgressReporter, Arc<CancellationToken>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        Self {
            action: Arc::new(
                move |state: S, progress: SubProgressReporter, token: Arc<CancellationToken>| {
                    action(state, progress, token).boxed()
                },
            ),
            description: None,
            weight,
        }
    }

    /// Sets the description; it also tags the step's sub progress.
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

    /// The step's progress weight.
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl<S> std::fmt::Debug for StepInfo<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepInfo")
            .field("description", &self.description)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// Runs weighted steps over a state, reporting normalized progress.
pub struct WeightedRunner<S> {
    name: String,
    initial: S,
    steps: Vec<StepInfo<S>>,
    reporter: Arc<dyn ProgressReporter>,
    sub_reporter: Arc<dyn ProgressReporter>,
    config: RunnerConfig,
    run_flag: RunFlag,
}

impl<S> WeightedRunner<S>
where
    S: Clone + Send + 'static,
{
    /// Creates a runner starting every run from a clone of `initial`.
    #[must_use]
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: name.into(),
            initial,
            steps: Vec::new(),
            reporter: Arc::new(NoOpProgressReporter),
            sub_reporter: Arc::new(NoOpProgressReporter),
            config: RunnerConfig::default(),
            run_flag: RunFlag::new(),
        }
    }

    /// Sets the reporter receiving weighted progress.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets the sink receiving steps' own nested progress.
    #[must_use]
    pub fn with_sub_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.sub_reporter = reporter;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: StepInfo<S>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a step.
    pub fn add_step(&mut self, step: StepInfo<S>) {
        self.steps.push(step);
    }

    /// Sum of all step weights.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.weight)).sum()
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_flag.is_set()
    }

    /// Runs all steps.
    ///
    /// The token is only passed through; steps are expected to observe it
    /// themselves. A failed step still consumes its weight. Unless
    /// `continue_on_exception` is set, the first failure ends the run.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::AlreadyRunning`] if a run is in progress.
    pub async fn run(&self, token: &Arc<CancellationToken>) -> Result<Outcome<S>, StagerunError> {
        let _guard = self.run_flag.acquire(&self.name)?;
        let total = self.total_weight();
        let mut state = self.initial.clone();
        let mut aggregate = Outcome::success(state.clone());
        let mut done: u64 = 0;

        info!(runner = %self.name, total, steps = self.steps.len(), "Starting weighted run");

        for (index, step) in self.steps.iter().enumerate() {
            let label = step
                .description
                .clone()
                .unwrap_or_else(|| format!("step #{index}"));
            let progress = SubProgressReporter::new(
                Arc::clone(&self.sub_reporter),
                step.description.clone(),
            );

            let timer = StepTimer::start(label.as_str());
            let input = state.clone();
            let result =
                AssertUnwindSafe(async { (step.action)(input, progress, Arc::clone(token)).await })
                    .catch_unwind()
                    .await;
            let duration_ms = timer.finish(self.config.slow_step_threshold());
            done += u64::from(step.weight);

            let step_outcome = match result {
                Ok(Ok(next)) => {
                    debug!(runner = %self.name, step = %label, duration_ms, "Step completed");
                    state = next;
                    Outcome::success(state.clone())
                }
                Ok(Err(e)) => {
                    warn!(runner = %self.name, step = %label, "Step failed: {e:#}");
                    Outcome::from_error(state.clone(), &e)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(runner = %self.name, step = %label, "Step panicked: {message}");
                    Outcome::failure(state.clone(), ErrorEntry::panicked(message))
                }
            };
            let failed = step_outcome.is_failed();
            aggregate += step_outcome;

            let mut snapshot = ProgressSnapshot::new(total, done);
            if let Some(description) = &step.description {
                snapshot = snapshot.with_description(description.as_str());
            }
            self.reporter.report(snapshot);

            if failed && !self.config.continue_on_exception {
                break;
            }
        }

        self.reporter.end(Some(ProgressSnapshot::new(total, done)));

        info!(
            runner = %self.name,
            completed = done,
            total,
            succeeded = aggregate.is_succeeded(),
            "Weighted run ended"
        );

        Ok(aggregate)
    }
}

impl<S> std::fmt::Debug for WeightedRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedRunner")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
