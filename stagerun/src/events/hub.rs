//! Subscriber fan-out for operation events.

use super::{EventSink, NoOpEventSink};
use crate::core::OperationEvent;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A subscriber callback.
pub type Subscriber = Arc<dyn Fn(&OperationEvent) + Send + Sync>;

/// An explicit dispatch context.
///
/// The hub hands every subscriber notification to the dispatcher instead
/// of calling subscribers inline, e.g. to marshal them onto a UI thread.
pub type Dispatcher = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Handle returned by [`EventHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Broadcasts events to a sink and any number of subscribers.
///
/// Subscribers run synchronously on whichever thread publishes, unless a
/// [`Dispatcher`] is installed. A panicking subscriber is logged and does
/// not affect the others or the publisher.
pub struct EventHub {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
    dispatcher: RwLock<Option<Dispatcher>>,
    sink: RwLock<Arc<dyn EventSink>>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dispatcher: RwLock::new(None),
            sink: RwLock::new(Arc::new(NoOpEventSink)),
        }
    }
}

impl EventHub {
    /// Creates a hub with no subscribers and a no-op sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&OperationEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(subscriber)));
        id
    }

    /// Removes a subscriber. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() < before
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Installs (or clears) the dispatch context.
    pub fn set_dispatcher(&self, dispatcher: Option<Dispatcher>) {
        *self.dispatcher.write() = dispatcher;
    }

    /// Replaces the event sink.
    pub fn set_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write() = sink;
    }

    /// Publishes an event to the sink and all subscribers.
    pub fn publish(&self, event: OperationEvent) {
        let sink = self.sink.read().clone();
        sink.try_emit(&event);

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        if subscribers.is_empty() {
            return;
        }

        let dispatcher = self.dispatcher.read().clone();
        match dispatcher {
            Some(dispatch) => dispatch(Box::new(move || notify_all(&subscribers, &event))),
            None => notify_all(&subscribers, &event),
        }
    }
}

fn notify_all(subscribers: &[Subscriber], event: &OperationEvent) {
    for subscriber in subscribers {
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            subscriber(event);
        })) {
            warn!(event_type = %event.event_type(), "Event subscriber panicked: {:?}", e);
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriber_count", &self.subscriber_count())
            .field("has_dispatcher", &self.dispatcher.read().is_some())
            .finish_non_exhaustive()
    }
}
