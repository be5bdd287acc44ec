//! Event sink trait and implementations.

use crate::core::OperationEvent;
use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

/// Trait for event sinks that can receive lifecycle events.
///
/// Sinks are the logging/monitoring side channel of a staged operation;
/// subscribers registered on the operation are the UI side channel.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &OperationEvent);

    /// Tries to emit an event without blocking.
    ///
    /// This method should never panic. Errors are logged but suppressed.
    fn try_emit(&self, event: &OperationEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &OperationEvent) {}

    fn try_emit(&self, _event: &OperationEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event: &OperationEvent) {
        let event_type = event.event_type();
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        let description = event.description.as_deref().unwrap_or_default();

        if let crate::core::EventKind::ErrorOccurred { error } = &event.kind {
            warn!(
                event_type = %event_type,
                run_id = %run_id,
                description,
                error = %error,
                "Event: {}", event_type
            );
            return;
        }

        match self.level {
            Level::DEBUG => {
                debug!(
                    event_type = %event_type,
                    run_id = %run_id,
                    description,
                    event_data = ?event.kind,
                    "Event: {}", event_type
                );
            }
            _ => {
                info!(
                    event_type = %event_type,
                    run_id = %run_id,
                    description,
                    event_data = ?event.kind,
                    "Event: {}", event_type
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &OperationEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &OperationEvent) {
        self.log_event(event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<OperationEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.read().clone()
    }

    /// Returns the dotted types of all collected events, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(OperationEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with a prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<OperationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &OperationEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &OperationEvent) {
        self.events.write().push(event.clone());
    }
}
