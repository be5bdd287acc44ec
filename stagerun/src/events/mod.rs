//! Event sink system for observability.
//!
//! This module provides the event emission infrastructure used by staged
//! operations: sinks for logging and monitoring, and a hub that fans events
//! out to subscribers through an optional dispatch context.

mod hub;
mod sink;

pub use hub::{Dispatcher, EventHub, Subscriber, SubscriptionId};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
