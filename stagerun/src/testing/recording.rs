//! An ordered start/finish journal shared by test steps.

use crate::runner::SequencedAction;
use crate::step::Step;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A body started.
    Started(String),
    /// A body returned, successfully or not.
    Finished(String),
}

/// Records when step bodies start and finish.
///
/// Ordering assertions are made against journal positions, which are
/// assigned under a lock and are therefore totally ordered.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLog {
    /// Creates a shared, empty journal.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records a start.
    pub fn start(&self, name: impl Into<String>) {
        self.entries.lock().push(LogEntry::Started(name.into()));
    }

    /// Records a finish.
    pub fn finish(&self, name: impl Into<String>) {
        self.entries.lock().push(LogEntry::Finished(name.into()));
    }

    /// Returns a copy of the journal.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Names in the order they started.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Started(name) => Some(name.clone()),
                LogEntry::Finished(_) => None,
            })
            .collect()
    }

    /// Names in the order they finished.
    #[must_use]
    pub fn finished(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                LogEntry::Finished(name) => Some(name.clone()),
                LogEntry::Started(_) => None,
            })
            .collect()
    }

    /// Returns true if `name` ever started.
    #[must_use]
    pub fn was_started(&self, name: &str) -> bool {
        self.position(&LogEntry::Started(name.to_string())).is_some()
    }

    /// Journal position of an entry.
    #[must_use]
    pub fn position(&self, entry: &LogEntry) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    /// Returns true if `first` finished before `second` started.
    #[must_use]
    pub fn finished_before_started(&self, first: &str, second: &str) -> bool {
        match (
            self.position(&LogEntry::Finished(first.to_string())),
            self.position(&LogEntry::Started(second.to_string())),
        ) {
            (Some(finished), Some(started)) => finished < started,
            _ => false,
        }
    }

    /// Returns true if the two bodies were running at the same time.
    #[must_use]
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        let pos = |entry: LogEntry| self.position(&entry);
        match (
            pos(LogEntry::Started(a.to_string())),
            pos(LogEntry::Finished(a.to_string())),
            pos(LogEntry::Started(b.to_string())),
            pos(LogEntry::Finished(b.to_string())),
        ) {
            (Some(a_start), Some(a_end), Some(b_start), Some(b_end)) => {
                a_start < b_end && b_start < a_end
            }
            _ => false,
        }
    }

    /// Clears the journal.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// A step that records itself, sleeps for `delay`, and succeeds.
    pub fn recorded_step(self: &Arc<Self>, name: &str, delay: Duration) -> Step {
        let log = Arc::clone(self);
        let name = name.to_string();
        Step::new(move |_ctx| {
            let log = Arc::clone(&log);
            let name = name.clone();
            async move {
                log.start(name.as_str());
                tokio::time::sleep(delay).await;
                log.finish(name);
                Ok(())
            }
        })
    }

    /// A step that records itself and fails with `message`.
    pub fn failing_step(self: &Arc<Self>, name: &str, message: &str) -> Step {
        let log = Arc::clone(self);
        let name = name.to_string();
        let message = message.to_string();
        Step::new(move |_ctx| {
            let log = Arc::clone(&log);
            let name = name.clone();
            let message = message.clone();
            async move {
                log.start(name.as_str());
                log.finish(name);
                Err(anyhow::anyhow!(message))
            }
        })
    }

    /// An action that records itself, sleeps for `delay`, and succeeds.
    pub fn recorded_action(self: &Arc<Self>, name: &str, delay: Duration) -> SequencedAction {
        let log = Arc::clone(self);
        let label = name.to_string();
        let name = name.to_string();
        SequencedAction::new(move || {
            let log = Arc::clone(&log);
            let name = name.clone();
            async move {
                log.start(name.as_str());
                tokio::time::sleep(delay).await;
                log.finish(name);
                Ok(())
            }
        })
        .with_name(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepContext;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_journal_positions() {
        let log = RecordingLog::new();
        log.start("a");
        log.start("b");
        log.finish("a");
        log.finish("b");
        log.start("c");
        log.finish("c");

        assert_eq!(log.started(), vec!["a", "b", "c"]);
        assert_eq!(log.finished(), vec!["a", "b", "c"]);
        assert!(log.overlapped("a", "b"));
        assert!(!log.overlapped("b", "c"));
        assert!(log.finished_before_started("b", "c"));
        assert!(!log.finished_before_started("a", "b"));
    }

    #[tokio::test]
    async fn test_recorded_and_failing_steps() {
        let log = RecordingLog::new();
        log.recorded_step("ok", Duration::ZERO)
            .invoke(StepContext::detached())
            .await
            .unwrap();
        let err = log
            .failing_step("bad", "boom")
            .invoke(StepContext::detached())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(log.started(), vec!["ok", "bad"]);
        assert!(log.was_started("bad"));
        assert!(!log.was_started("missing"));
    }
}
