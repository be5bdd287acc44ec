//! Grouped async action runner.
//!
//! The simplest runner: actions tagged with an optional sequence number
//! are grouped, groups run in ascending order, and the members of a group
//! run concurrently. There is no failure policy at this layer; the first
//! error (in declaration order) of a group aborts the run once the whole
//! group has settled. Of [`RunnerConfig`] only the slow-step threshold
//! applies here.

use crate::cancellation::RunFlag;
use crate::config::RunnerConfig;
use crate::errors::StagerunError;
use crate::observability::StepTimer;
use crate::step::{plan_groups, Sequenced};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Boxed future returned by an action.
pub type ActionFuture = BoxFuture<'static, anyhow::Result<()>>;

/// An async action with an optional sequence number.
#[derive(Clone)]
pub struct SequencedAction {
    action: Arc<dyn Fn() -> ActionFuture + Send + Sync>,
    name: Option<String>,
    sequence: Option<i32>,
    enabled: bool,
}

impl SequencedAction {
    /// Creates an enabled action with no sequence number.
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            action: Arc::new(move || action().boxed()),
            name: None,
            sequence: None,
            enabled: true,
        }
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets a name used in logs and errors.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables or disables the action.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The action's name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("action #{index}"))
    }
}

impl Sequenced for SequencedAction {
    fn sequence(&self) -> Option<i32> {
        self.sequence
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl std::fmt::Debug for SequencedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedAction")
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupedRunSummary {
    /// Number of groups awaited.
    pub groups_executed: usize,
    /// Number of actions invoked.
    pub actions_run: usize,
    /// Number of actions slower than the configured threshold.
    pub slow_actions: usize,
}

/// Runs [`SequencedAction`]s group by group.
#[derive(Debug)]
pub struct GroupedActionRunner {
    name: String,
    actions: Vec<SequencedAction>,
    config: RunnerConfig,
    run_flag: RunFlag,
}

impl GroupedActionRunner {
    /// Creates an empty runner.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            config: RunnerConfig::default(),
            run_flag: RunFlag::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: SequencedAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Appends an action.
    pub fn add_action(&mut self, action: SequencedAction) {
        self.actions.push(action);
    }

    /// Returns the number of registered actions, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_flag.is_set()
    }

    /// Runs all enabled actions.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::AlreadyRunning`] if a run is in progress,
    /// or [`StagerunError::StepFailed`] for the first failing action of the
    /// first group that had a failure. Every action of that group has
    /// completed by then; later groups never start.
    pub async fn run(&self) -> Result<GroupedRunSummary, StagerunError> {
        let _guard = self.run_flag.acquire(&self.name)?;
        let start = Instant::now();
        let groups = plan_groups(&self.actions);
        let threshold = self.config.slow_step_threshold();
        let mut summary = GroupedRunSummary::default();

        info!(runner = %self.name, groups = groups.len(), "Starting grouped run");

        for group in groups {
            debug!(
                runner = %self.name,
                sequence = ?group.key,
                size = group.len(),
                "Launching group"
            );

            let results = join_all(group.members.iter().map(|(index, action)| {
                let timer = StepTimer::start(action.label(*index));
                (action.action)().map(move |result| {
                    let duration_ms = timer.finish(threshold);
                    let slow = threshold.is_some_and(|t| duration_ms > t.as_secs_f64() * 1000.0);
                    (result, slow)
                })
            }))
            .await;

            summary.groups_executed += 1;
            summary.actions_run += results.len();
            summary.slow_actions += results.iter().filter(|(_, slow)| *slow).count();

            let failure = group
                .members
                .iter()
                .zip(results)
                .find_map(|((index, action), (result, _))| {
                    result.err().map(|e| (action.label(*index), e))
                });

            if let Some((label, error)) = failure {
                warn!(runner = %self.name, step = %label, "Action failed: {error:#}");
                return Err(StagerunError::step_failed(label, format!("{error:#}")));
            }
        }

        info!(
            runner = %self.name,
            groups = summary.groups_executed,
            actions = summary.actions_run,
            slow = summary.slow_actions,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Grouped run completed"
        );

        Ok(summary)
    }
}
