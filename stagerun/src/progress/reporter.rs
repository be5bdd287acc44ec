//! Progress reporter trait and implementations.

use super::ProgressSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, Level};

/// A sink for progress snapshots.
///
/// Reporters decouple runners from how progress is displayed (a terminal
/// bar, a GUI dialog, a log). Implementations must not panic; they are
/// called synchronously from the run loop.
#[cfg_attr(test, mockall::automock)]
pub trait ProgressReporter: Send + Sync {
    /// Receives a progress snapshot.
    fn report(&self, snapshot: ProgressSnapshot);

    /// Signals that no further snapshots will follow.
    fn end(&self, final_snapshot: Option<ProgressSnapshot>);
}

/// A reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _snapshot: ProgressSnapshot) {}

    fn end(&self, _final_snapshot: Option<ProgressSnapshot>) {}
}

/// A reporter that logs snapshots using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingProgressReporter {
    level: Level,
}

impl Default for LoggingProgressReporter {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressReporter {
    /// Creates a new logging reporter with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging reporter.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, snapshot: &ProgressSnapshot, ended: bool) {
        if self.level == Level::DEBUG {
            debug!(
                max = ?snapshot.max,
                current = ?snapshot.current,
                sender = ?snapshot.sender,
                ended,
                "Progress: {}", snapshot
            );
        } else {
            info!(
                max = ?snapshot.max,
                current = ?snapshot.current,
                sender = ?snapshot.sender,
                ended,
                "Progress: {}", snapshot
            );
        }
    }
}

impl ProgressReporter for LoggingProgressReporter {
    fn report(&self, snapshot: ProgressSnapshot) {
        self.log(&snapshot, false);
    }

    fn end(&self, final_snapshot: Option<ProgressSnapshot>) {
        self.log(&final_snapshot.unwrap_or_default(), true);
    }
}

/// A collecting reporter for testing and inspection.
#[derive(Debug, Default)]
pub struct CollectingProgressReporter {
    snapshots: RwLock<Vec<ProgressSnapshot>>,
    ended: RwLock<Option<Option<ProgressSnapshot>>>,
}

impl CollectingProgressReporter {
    /// Creates a new collecting reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all reported snapshots.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.read().clone()
    }

    /// Returns `(current, max)` pairs of all reported snapshots.
    #[must_use]
    pub fn positions(&self) -> Vec<(Option<u64>, Option<u64>)> {
        self.snapshots
            .read()
            .iter()
            .map(|s| (s.current, s.max))
            .collect()
    }

    /// Returns true once `end` has been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.read().is_some()
    }

    /// Returns the snapshot passed to `end`, if any.
    #[must_use]
    pub fn final_snapshot(&self) -> Option<ProgressSnapshot> {
        self.ended.read().clone().flatten()
    }

    /// Clears everything collected so far.
    pub fn clear(&self) {
        self.snapshots.write().clear();
        *self.ended.write() = None;
    }
}

impl ProgressReporter for CollectingProgressReporter {
    fn report(&self, snapshot: ProgressSnapshot) {
        self.snapshots.write().push(snapshot);
    }

    fn end(&self, final_snapshot: Option<ProgressSnapshot>) {
        *self.ended.write() = Some(final_snapshot);
    }
}

/// A reporter backed by a closure; `end` forwards the final snapshot, if any.
pub struct FnProgressReporter<F>
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    func: F,
}

impl<F> FnProgressReporter<F>
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    /// Creates a new closure-backed reporter.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnProgressReporter<F>
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProgressReporter").finish_non_exhaustive()
    }
}

impl<F> ProgressReporter for FnProgressReporter<F>
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    fn report(&self, snapshot: ProgressSnapshot) {
        (self.func)(snapshot);
    }

    fn end(&self, final_snapshot: Option<ProgressSnapshot>) {
        if let Some(snapshot) = final_snapshot {
            (self.func)(snapshot);
        }
    }
}

/// A reporter handed to a single step for its own nested progress.
///
/// Snapshots are tagged with the step's description as `sender` and sent
/// to a dedicated sub-sink, never to the parent reporter, so nested
/// progress cannot collide with the runner's own weight-based reporting.
#[derive(Clone)]
pub struct SubProgressReporter {
    sink: Arc<dyn ProgressReporter>,
    sender: Option<String>,
}

impl SubProgressReporter {
    /// Creates a sub reporter forwarding to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressReporter>, sender: Option<String>) -> Self {
        Self { sink, sender }
    }

    /// Creates a sub reporter that discards everything.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(NoOpProgressReporter), None)
    }

    /// Returns the sender tag.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Reports `current` out of `max` with a description.
    pub fn step(&self, max: u64, current: u64, description: impl Into<String>) {
        self.report(ProgressSnapshot::new(max, current).with_description(description));
    }

    fn tag(&self, mut snapshot: ProgressSnapshot) -> ProgressSnapshot {
        if snapshot.sender.is_none() {
            snapshot.sender.clone_from(&self.sender);
        }
        snapshot
    }
}

impl std::fmt::Debug for SubProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubProgressReporter")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter for SubProgressReporter {
    fn report(&self, snapshot: ProgressSnapshot) {
        self.sink.report(self.tag(snapshot));
    }

    fn end(&self, final_snapshot: Option<ProgressSnapshot>) {
        self.sink.end(final_snapshot.map(|s| self.tag(s)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_noop_reporter() {
        let reporter = NoOpProgressReporter;
        reporter.report(ProgressSnapshot::new(2, 1));
        reporter.end(None);
    }

    #[test]
    fn test_logging_reporter() {
        let reporter = LoggingProgressReporter::default();
        reporter.report(ProgressSnapshot::new(2, 1).with_description("half"));
        reporter.end(Some(ProgressSnapshot::message("done")));
        LoggingProgressReporter::debug().end(None);
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingProgressReporter::new();
        reporter.report(ProgressSnapshot::new(4, 1));
        reporter.report(ProgressSnapshot::new(4, 4));
        assert!(!reporter.is_ended());

        reporter.end(Some(ProgressSnapshot::message("finished")));
        assert!(reporter.is_ended());
        assert_eq!(reporter.positions(), vec![(Some(1), Some(4)), (Some(4), Some(4))]);
        assert_eq!(
            reporter.final_snapshot().and_then(|s| s.description),
            Some("finished".to_string())
        );

        reporter.clear();
        assert!(reporter.snapshots().is_empty());
        assert!(!reporter.is_ended());
    }

    #[test]
    fn test_fn_reporter() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let reporter = FnProgressReporter::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(ProgressSnapshot::new(1, 1));
        reporter.end(None);
        reporter.end(Some(ProgressSnapshot::message("bye")));

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sub_reporter_tags_sender() {
        let sink = Arc::new(CollectingProgressReporter::new());
        let sub = SubProgressReporter::new(sink.clone(), Some("resize images".to_string()));

        sub.step(10, 3, "image 3");
        sub.report(ProgressSnapshot::message("explicit").with_sender("other"));
        sub.end(None);

        let snapshots = sink.snapshots();
        assert_eq!(snapshots[0].sender.as_deref(), Some("resize images"));
        assert_eq!(snapshots[0].current, Some(3));
        assert_eq!(snapshots[1].sender.as_deref(), Some("other"));
        assert!(sink.is_ended());
    }

    #[test]
    fn test_sub_reporter_forwards_to_mock() {
        let mut mock = MockProgressReporter::new();
        mock.expect_report()
            .with(eq(ProgressSnapshot::new(2, 1).with_sender("step")))
            .times(1)
            .return_const(());
        mock.expect_end().times(1).return_const(());

        let sub = SubProgressReporter::new(Arc::new(mock), Some("step".to_string()));
        sub.report(ProgressSnapshot::new(2, 1));
        sub.end(None);
    }

    #[test]
    fn test_detached_sub_reporter() {
        let sub = SubProgressReporter::detached();
        assert!(sub.sender().is_none());
        sub.step(1, 1, "ignored");
    }
}
