//! Per-step execution context.

use crate::cancellation::CancellationToken;
use crate::core::{EventKind, OperationEvent};
use crate::events::EventHub;
use std::sync::Arc;
use uuid::Uuid;

/// Publishes sub-operation events on behalf of a running step.
///
/// A step that drives a nested task of its own reports it through this
/// handle. Events go out on the [`EventChannel::SubOperation`] track of the
/// owning operation, tagged with the same run id. A detached handle drops
/// everything.
///
/// [`EventChannel::SubOperation`]: crate::core::EventChannel::SubOperation
#[derive(Clone, Default)]
pub struct SubOperation {
    hub: Option<Arc<EventHub>>,
    run_id: Option<Uuid>,
}

impl SubOperation {
    /// Creates a handle bound to an event hub and run.
    #[must_use]
    pub fn new(hub: Arc<EventHub>, run_id: Uuid) -> Self {
        Self {
            hub: Some(hub),
            run_id: Some(run_id),
        }
    }

    /// Creates a handle that publishes nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Returns true if events published here reach a hub.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.hub.is_some()
    }

    /// Announces a sub-operation with `total` steps.
    pub fn starting(&self, total: usize, description: Option<&str>) {
        self.publish(EventKind::Starting { total }, description);
    }

    /// Announces that a sub-step is about to run.
    pub fn step_increasing(&self, current: usize, total: usize, description: Option<&str>) {
        self.publish(EventKind::StepIncreasing { current, total }, description);
    }

    /// Announces that a sub-step finished.
    pub fn step_increased(&self, current: usize, total: usize, description: Option<&str>) {
        self.publish(EventKind::StepIncreased { current, total }, description);
    }

    /// Announces the end of the sub-operation.
    pub fn ended(&self, succeeded: bool, canceled: bool) {
        self.publish(EventKind::Ended { succeeded, canceled }, None);
    }

    /// Announces that the sub-operation was canceled.
    pub fn canceled(&self) {
        self.publish(EventKind::Canceled, None);
    }

    /// Announces a sub-step failure.
    pub fn error_occurred(&self, error: impl Into<String>) {
        self.publish(
            EventKind::ErrorOccurred {
                error: error.into(),
            },
            None,
        );
    }

    fn publish(&self, kind: EventKind, description: Option<&str>) {
        if let Some(hub) = &self.hub {
            hub.publish(OperationEvent::sub_operation(self.run_id, kind).with_description(description));
        }
    }
}

impl std::fmt::Debug for SubOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubOperation")
            .field("run_id", &self.run_id)
            .field("attached", &self.hub.is_some())
            .finish()
    }
}

/// What a step body receives when it is launched.
#[derive(Debug, Clone)]
pub struct StepContext {
    token: Arc<CancellationToken>,
    index: usize,
    description: Option<String>,
    sub_operation: SubOperation,
}

impl StepContext {
    /// Creates a new context for the step at `index`.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>, index: usize, description: Option<String>) -> Self {
        Self {
            token,
            index,
            description,
            sub_operation: SubOperation::detached(),
        }
    }

    /// Creates a context with a fresh token, for running a step by hand.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(CancellationToken::shared(), 0, None)
    }

    /// Attaches a sub-operation handle.
    #[must_use]
    pub fn with_sub_operation(mut self, sub_operation: SubOperation) -> Self {
        self.sub_operation = sub_operation;
        self
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Shorthand for `token().is_cancelled()`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Declaration index of the step.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The step's description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Handle for reporting nested progress.
    #[must_use]
    pub fn sub_operation(&self) -> &SubOperation {
        &self.sub_operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_detached_sub_operation_is_silent() {
        let sub = SubOperation::detached();
        assert!(!sub.is_attached());
        sub.starting(3, Some("copy"));
        sub.ended(true, false);
    }

    #[test]
    fn test_sub_operation_publishes_on_sub_channel() {
        let hub = Arc::new(EventHub::new());
        let sink = Arc::new(CollectingEventSink::new());
        hub.set_sink(sink.clone());
        let run_id = Uuid::new_v4();

        let sub = SubOperation::new(hub, run_id);
        sub.starting(2, Some("unpack"));
        sub.step_increasing(0, 2, Some("file a"));
        sub.step_increased(1, 2, Some("file a"));
        sub.ended(true, false);

        assert_eq!(
            sink.event_types(),
            vec![
                "sub_operation.starting",
                "sub_operation.step_increasing",
                "sub_operation.step_increased",
                "sub_operation.ended",
            ]
        );
        assert!(sink.events().iter().all(|e| e.run_id == Some(run_id)));
        assert_eq!(sink.events()[1].description.as_deref(), Some("file a"));
    }

    #[test]
    fn test_context_accessors() {
        let token = CancellationToken::shared();
        let ctx = StepContext::new(token.clone(), 4, Some("load".into()));
        assert_eq!(ctx.index(), 4);
        assert_eq!(ctx.description(), Some("load"));
        assert!(!ctx.is_cancelled());

        token.cancel("stop");
        assert!(ctx.is_cancelled());
    }
}
