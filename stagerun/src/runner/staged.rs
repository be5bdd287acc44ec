//! Staged operation: priority-grouped steps with lifecycle events.
//!
//! [`StagedOperation::start`] snapshots the registered steps, derives the
//! priority groups and spawns a run loop on the current tokio runtime.
//! Every member of a group is launched as its own task before any of them
//! is awaited; the next group is only planned once the whole group has
//! settled. The run loop is the single owner of the run bookkeeping and the
//! only publisher of main-channel events.

use super::panic_message;
use crate::cancellation::{CancellationToken, RunFlag, RunGuard};
use crate::config::RunnerConfig;
use crate::core::{ErrorEntry, EventKind, OperationEvent, Outcome, RunState};
use crate::errors::StagerunError;
use crate::events::{Dispatcher, EventHub, EventSink, SubscriptionId};
use crate::observability::StepTimer;
use crate::step::{plan_groups, Step, StepContext, StepGroup, SubOperation};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Summary of one run, carried as the value of the run's [`Outcome`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    /// Steps whose body was invoked.
    pub launched: usize,
    /// Steps that returned `Ok`.
    pub succeeded_steps: usize,
    /// Steps that returned `Err` or panicked.
    pub failed_steps: usize,
    /// Enabled steps that were never launched.
    pub skipped_steps: usize,
    /// Whether cancellation was requested during the run.
    pub canceled: bool,
    /// Wall time of the run.
    pub duration_ms: f64,
}

/// Bookkeeping of the current (or last) run.
#[derive(Debug, Default)]
struct RunContext {
    state: RunState,
    run_id: Option<Uuid>,
    completed: usize,
    total: usize,
    last_error: Option<String>,
}

/// Drives a collection of [`Step`]s and reports their lifecycle.
///
/// Events are published through an [`EventHub`]: subscribe with
/// [`subscribe`](Self::subscribe), forward to an [`EventSink`] with
/// [`with_event_sink`](Self::with_event_sink), and marshal notifications
/// onto a specific context with [`with_dispatcher`](Self::with_dispatcher).
///
/// Dropping the operation cancels a run that is still in flight.
pub struct StagedOperation {
    name: String,
    steps: Vec<Step>,
    config: RunnerConfig,
    hub: Arc<EventHub>,
    context: Arc<RwLock<RunContext>>,
    token: Mutex<Arc<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<Outcome<OperationReport>>>>,
    run_flag: RunFlag,
    disposed: AtomicBool,
}

impl StagedOperation {
    /// Creates an operation with no steps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            config: RunnerConfig::default(),
            hub: Arc::new(EventHub::new()),
            context: Arc::new(RwLock::new(RunContext::default())),
            token: Mutex::new(CancellationToken::shared()),
            handle: Mutex::new(None),
            run_flag: RunFlag::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a step. Runs already in flight are not affected.
    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the continue-on-exception policy for subsequent runs.
    pub fn set_continue_on_exception(&mut self, continue_on_exception: bool) {
        self.config.continue_on_exception = continue_on_exception;
    }

    /// Forwards every event to `sink`.
    #[must_use]
    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        self.hub.set_sink(sink);
        self
    }

    /// Hands every subscriber notification to `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(self, dispatcher: Dispatcher) -> Self {
        self.hub.set_dispatcher(Some(dispatcher));
        self
    }

    /// Registers an event subscriber.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&OperationEvent) + Send + Sync + 'static,
    {
        self.hub.subscribe(subscriber)
    }

    /// Removes an event subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the registered steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.context.read().state
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_operating(&self) -> bool {
        self.run_flag.is_set()
    }

    /// Returns the id of the current (or last) run.
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        self.context.read().run_id
    }

    /// Returns the last captured step failure of the current (or last) run.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.context.read().last_error.clone()
    }

    /// Returns the number of steps that finished so far.
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.context.read().completed
    }

    /// Returns the number of steps the current (or last) run will attempt.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.context.read().total
    }

    /// Returns true once [`dispose`](Self::dispose) was called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Starts a run in the background and returns its id.
    ///
    /// Step failures never surface here; they are reported through events
    /// and the outcome returned by [`wait`](Self::wait).
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::Disposed`] after disposal,
    /// [`StagerunError::AlreadyRunning`] while a run is in progress, and
    /// [`StagerunError::Internal`] when called outside a tokio runtime.
    pub fn start(&self) -> Result<Uuid, StagerunError> {
        if self.is_disposed() {
            return Err(StagerunError::disposed(&self.name));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StagerunError::Internal(format!("no tokio runtime: {e}")))?;
        let guard = self.run_flag.acquire(&self.name)?;

        let run_id = Uuid::new_v4();
        let token = CancellationToken::shared();
        *self.token.lock() = Arc::clone(&token);

        let groups = plan_groups(&self.steps);
        let total = groups.iter().map(StepGroup::len).sum();

        {
            let mut context = self.context.write();
            *context = RunContext {
                state: RunState::Operating,
                run_id: Some(run_id),
                completed: 0,
                total,
                last_error: None,
            };
        }

        info!(
            runner = %self.name,
            %run_id,
            total,
            groups = groups.len(),
            "Starting staged operation"
        );

        let run = RunLoop {
            name: self.name.clone(),
            run_id,
            total,
            config: self.config.clone(),
            hub: self.config.emit_events.then(|| Arc::clone(&self.hub)),
            context: Arc::clone(&self.context),
            token,
        };
        run.publish(EventKind::Starting { total }, None);

        let handle = runtime.spawn(run.execute(groups, guard));
        *self.handle.lock() = Some(handle);

        Ok(run_id)
    }

    /// Waits for the run started by [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::NotStarted`] if there is no run to wait
    /// for (never started, or already waited on), and
    /// [`StagerunError::Internal`] if the run loop itself was lost.
    pub async fn wait(&self) -> Result<Outcome<OperationReport>, StagerunError> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or_else(|| StagerunError::NotStarted {
                runner: self.name.clone(),
            })?;

        handle
            .await
            .map_err(|e| StagerunError::Internal(format!("run loop of '{}' failed: {e}", self.name)))
    }

    /// Starts a run and waits for it.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start) and [`wait`](Self::wait).
    pub async fn run(&self) -> Result<Outcome<OperationReport>, StagerunError> {
        self.start()?;
        self.wait().await
    }

    /// Requests cancellation of the current run.
    ///
    /// No further steps are launched; steps already running are expected
    /// to observe the token. A `canceled` event is published even when no
    /// run is in progress.
    pub fn cancel(&self) {
        let token = Arc::clone(&self.token.lock());
        token.cancel(self.config.cancel_reason.as_str());

        warn!(runner = %self.name, reason = %self.config.cancel_reason, "Cancellation requested");
        if self.config.emit_events {
            self.hub
                .publish(OperationEvent::main(self.run_id(), EventKind::Canceled));
        }
    }

    /// Releases the cancellation source and the pending run handle.
    ///
    /// A run still in flight is cancelled and detached. Any later
    /// [`start`](Self::start) fails with [`StagerunError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release();
        debug!(runner = %self.name, "Staged operation disposed");
    }

    fn release(&self) {
        if self.run_flag.is_set() {
            self.token.lock().cancel("operation disposed");
        }
        self.handle.lock().take();
    }
}

impl Drop for StagedOperation {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StagedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedOperation")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Everything a spawned run needs, detached from the operation itself.
struct RunLoop {
    name: String,
    run_id: Uuid,
    total: usize,
    config: RunnerConfig,
    hub: Option<Arc<EventHub>>,
    context: Arc<RwLock<RunContext>>,
    token: Arc<CancellationToken>,
}

type StepResult = Result<anyhow::Result<()>, tokio::task::JoinError>;

impl RunLoop {
    fn publish(&self, kind: EventKind, description: Option<&str>) {
        if let Some(hub) = &self.hub {
            hub.publish(OperationEvent::main(Some(self.run_id), kind).with_description(description));
        }
    }

    fn sub_operation(&self) -> SubOperation {
        match &self.hub {
            Some(hub) => SubOperation::new(Arc::clone(hub), self.run_id),
            None => SubOperation::detached(),
        }
    }

    async fn execute(self, groups: Vec<StepGroup<Step>>, guard: RunGuard) -> Outcome<OperationReport> {
        let started = Instant::now();
        let mut report = OperationReport::default();
        let mut errors = Vec::new();
        let mut completed = 0;
        let mut halted = false;

        for group in groups {
            if halted || self.token.is_cancelled() {
                report.skipped_steps += group.len();
                continue;
            }

            debug!(runner = %self.name, priority = ?group.key, size = group.len(), "Launching group");

            let mut in_flight = FuturesUnordered::new();
            for (index, step) in group.members {
                if self.token.is_cancelled() {
                    report.skipped_steps += 1;
                    continue;
                }

                let label = step.label(index);
                self.publish(
                    EventKind::StepIncreasing {
                        current: report.launched,
                        total: self.total,
                    },
                    step.description(),
                );
                debug!(runner = %self.name, step = %label, "Launching step");

                let ctx = StepContext::new(
                    Arc::clone(&self.token),
                    index,
                    step.description().map(str::to_string),
                )
                .with_sub_operation(self.sub_operation());
                let description = step.description().map(str::to_string);
                let timer = StepTimer::start(label.as_str());
                let task = tokio::spawn(async move { step.invoke(ctx).await });

                report.launched += 1;
                in_flight.push(task.map(move |joined: StepResult| (label, description, timer, joined)));
            }

            while let Some((label, description, timer, joined)) = in_flight.next().await {
                completed += 1;
                let duration_ms = timer.finish(self.config.slow_step_threshold());

                let entry = match joined {
                    Ok(Ok(())) => {
                        report.succeeded_steps += 1;
                        self.context.write().completed = completed;
                        debug!(
                            runner = %self.name,
                            step = %label,
                            completed,
                            total = self.total,
                            duration_ms,
                            "Step completed"
                        );
                        self.publish(
                            EventKind::StepIncreased {
                                current: completed,
                                total: self.total,
                            },
                            description.as_deref(),
                        );
                        continue;
                    }
                    Ok(Err(e)) => {
                        let message = format!("{e:#}");
                        warn!(runner = %self.name, step = %label, "Step failed: {message}");
                        ErrorEntry::step_failed(message)
                    }
                    Err(join_error) if join_error.is_panic() => {
                        let message = panic_message(join_error.into_panic().as_ref());
                        error!(runner = %self.name, step = %label, "Step panicked: {message}");
                        ErrorEntry::panicked(message)
                    }
                    Err(join_error) => {
                        let message = format!("step task was aborted: {join_error}");
                        warn!(runner = %self.name, step = %label, "{message}");
                        ErrorEntry::step_failed(message)
                    }
                };

                report.failed_steps += 1;
                {
                    let mut context = self.context.write();
                    context.completed = completed;
                    context.last_error = Some(entry.message.clone());
                }
                self.publish(
                    EventKind::ErrorOccurred {
                        error: entry.message.clone(),
                    },
                    description.as_deref(),
                );
                errors.push(entry);

                if !self.config.continue_on_exception {
                    halted = true;
                }
            }
        }

        let canceled = self.token.is_cancelled();
        if canceled {
            let reason = self
                .token
                .reason()
                .unwrap_or_else(|| self.config.cancel_reason.clone());
            errors.push(ErrorEntry::canceled(reason));
        }

        report.canceled = canceled;
        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let succeeded = report.failed_steps == 0;

        self.context.write().state = RunState::finished(canceled, !succeeded);
        guard.release();

        info!(
            runner = %self.name,
            run_id = %self.run_id,
            completed,
            total = self.total,
            succeeded,
            canceled,
            duration_ms = report.duration_ms,
            "Staged operation ended"
        );
        self.publish(EventKind::Ended { succeeded, canceled }, None);

        Outcome::with_errors(report, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codes;
    use crate::events::CollectingEventSink;
    use crate::testing::{assert_error_codes, assert_outcome_failed, assert_outcome_succeeded, RecordingLog};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ok_step(name: &'static str) -> Step {
        Step::from_fn(|_| Ok(())).with_description(name)
    }

    fn failing(name: &'static str) -> Step {
        Step::from_fn(|_| anyhow::bail!("boom")).with_description(name)
    }

    #[tokio::test]
    async fn test_sequential_event_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let operation = StagedOperation::new("seq")
            .with_event_sink(sink.clone())
            .with_step(ok_step("a"))
            .with_step(ok_step("b"));

        let outcome = operation.run().await.unwrap();
        assert_outcome_succeeded(&outcome);
        assert_eq!(outcome.value().succeeded_steps, 2);
        assert_eq!(operation.state(), RunState::Completed);

        assert_eq!(
            sink.event_types(),
            vec![
                "operation.starting",
                "operation.step_increasing",
                "operation.step_increased",
                "operation.step_increasing",
                "operation.step_increased",
                "operation.ended",
            ]
        );
        let kinds: Vec<EventKind> = sink.events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds[0], EventKind::Starting { total: 2 });
        assert_eq!(kinds[3], EventKind::StepIncreasing { current: 1, total: 2 });
        assert_eq!(kinds[4], EventKind::StepIncreased { current: 2, total: 2 });
        assert_eq!(kinds[5], EventKind::Ended { succeeded: true, canceled: false });
    }

    #[tokio::test]
    async fn test_concurrent_group_members_get_distinct_launch_indices() {
        let sink = Arc::new(CollectingEventSink::new());
        let operation = StagedOperation::new("fan-out")
            .with_event_sink(sink.clone())
            .with_step(ok_step("a").with_priority(1))
            .with_step(ok_step("b").with_priority(1))
            .with_step(ok_step("c").with_priority(1))
            .with_step(ok_step("d").with_priority(2));

        operation.run().await.unwrap();

        let launched: Vec<usize> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::StepIncreasing { current, total } => {
                    assert_eq!(total, 4);
                    Some(current)
                }
                _ => None,
            })
            .collect();
        assert_eq!(launched, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_halts_later_steps() {
        let log = RecordingLog::new();
        let sink = Arc::new(CollectingEventSink::new());
        let operation = StagedOperation::new("halt")
            .with_event_sink(sink.clone())
            .with_step(log.recorded_step("one", Duration::ZERO))
            .with_step(failing("two"))
            .with_step(log.recorded_step("three", Duration::ZERO));

        let outcome = operation.run().await.unwrap();
        assert_outcome_failed(&outcome);
        assert_error_codes(&outcome, &[codes::STEP_FAILED]);
        assert_eq!(outcome.value().skipped_steps, 1);
        assert!(!log.was_started("three"));
        assert_eq!(operation.state(), RunState::Faulted);
        assert_eq!(operation.last_error().as_deref(), Some("boom"));

        let errors = sink.events_of_type("operation.error_occurred");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].description.as_deref(), Some("two"));
        assert_eq!(
            sink.events().last().map(|e| e.kind.clone()),
            Some(EventKind::Ended { succeeded: false, canceled: false })
        );
    }

    #[tokio::test]
    async fn test_continue_on_exception_runs_everything() {
        let log = RecordingLog::new();
        let mut operation = StagedOperation::new("continue")
            .with_step(failing("first"))
            .with_step(log.recorded_step("second", Duration::ZERO));
        operation.set_continue_on_exception(true);

        let outcome = operation.run().await.unwrap();
        assert_outcome_failed(&outcome);
        assert!(log.was_started("second"));
        assert_eq!(outcome.value().failed_steps, 1);
        assert_eq!(outcome.value().succeeded_steps, 1);
        assert_eq!(operation.completed_steps(), 2);
    }

    #[tokio::test]
    async fn test_panicking_step_is_captured() {
        let operation = StagedOperation::new("panic")
            .with_step(Step::from_fn(|_| panic!("step blew up")));

        let outcome = operation.run().await.unwrap();
        assert_error_codes(&outcome, &[codes::STEP_PANICKED]);
        assert_eq!(outcome.errors()[0].message, "step blew up");
        assert!(!operation.is_operating());
    }

    #[tokio::test]
    async fn test_cancel_without_run_still_publishes() {
        let sink = Arc::new(CollectingEventSink::new());
        let operation = StagedOperation::new("idle").with_event_sink(sink.clone());

        operation.cancel();
        assert_eq!(sink.event_types(), vec!["operation.canceled"]);
        assert_eq!(operation.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_wait_without_start() {
        let operation = StagedOperation::new("nothing");
        let err = operation.wait().await.unwrap_err();
        assert!(matches!(err, StagerunError::NotStarted { .. }));
    }

    #[tokio::test]
    async fn test_start_after_dispose_fails() {
        let operation = StagedOperation::new("gone").with_step(ok_step("a"));
        operation.dispose();
        assert!(operation.is_disposed());

        let err = operation.start().unwrap_err();
        assert!(matches!(err, StagerunError::Disposed { .. }));
    }

    #[tokio::test]
    async fn test_restart_after_completion() {
        let log = RecordingLog::new();
        let operation = StagedOperation::new("again").with_step(log.recorded_step("a", Duration::ZERO));

        let first = operation.run().await.unwrap();
        let first_id = operation.run_id();
        let second = operation.run().await.unwrap();

        assert_outcome_succeeded(&first);
        assert_outcome_succeeded(&second);
        assert_ne!(first_id, operation.run_id());
        assert_eq!(log.started(), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn test_events_disabled() {
        let sink = Arc::new(CollectingEventSink::new());
        let operation = StagedOperation::new("quiet")
            .with_config(RunnerConfig::new().with_emit_events(false))
            .with_event_sink(sink.clone())
            .with_step(ok_step("a"));

        operation.run().await.unwrap();
        operation.cancel();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_dispatcher_receives_notifications() {
        let queued = Arc::new(Mutex::new(Vec::<Box<dyn FnOnce() + Send>>::new()));
        let queue = queued.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let operation = StagedOperation::new("dispatched")
            .with_dispatcher(Arc::new(move |job: Box<dyn FnOnce() + Send>| queue.lock().push(job)))
            .with_step(ok_step("a"));
        operation.subscribe(move |event| seen_clone.lock().push(event.event_type()));

        operation.run().await.unwrap();
        // Nothing is delivered until the dispatch context drains its queue.
        assert!(seen.lock().is_empty());

        let jobs: Vec<_> = std::mem::take(&mut *queued.lock());
        for job in jobs {
            job();
        }
        assert_eq!(seen.lock().first().map(String::as_str), Some("operation.starting"));
        assert_eq!(seen.lock().last().map(String::as_str), Some("operation.ended"));
    }

    #[tokio::test]
    async fn test_sub_operation_events_share_run_id() {
        let sink = Arc::new(CollectingEventSink::new());
        let step = Step::from_fn(|ctx| {
            let sub = ctx.sub_operation();
            sub.starting(1, Some("nested"));
            sub.step_increased(1, 1, None);
            sub.ended(true, false);
            Ok(())
        });
        let operation = StagedOperation::new("nested")
            .with_event_sink(sink.clone())
            .with_step(step);

        let run_id = operation.start().unwrap();
        operation.wait().await.unwrap();

        let nested = sink.events_of_type("sub_operation");
        assert_eq!(nested.len(), 3);
        assert!(nested.iter().all(|e| e.run_id == Some(run_id)));
    }
}
