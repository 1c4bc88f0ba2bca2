//! Relationship lifecycle events and event sinks.
//!
//! The engine emits events fire-and-forget: sinks must not block and the
//! engine never waits for, or checks, delivery.
//!
//! # Sinks
//!
//! - `LogEventSink`: Writes one log line per event
//! - `BroadcastEventSink`: Publishes on a tokio broadcast channel
//! - `NoopEventSink`: Drops everything
//! - `RecordingEventSink`: Keeps events in memory (tests, `test-utils` feature)

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::Relationship;

// ============================================================================
// Events
// ============================================================================

/// An event emitted by the relationship service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum RelationshipEvent {
    /// A relationship was created.
    #[serde(rename = "relationship.created")]
    Created(Relationship),
    /// A relationship was updated; carries the new state.
    #[serde(rename = "relationship.updated")]
    Updated(Relationship),
    /// A relationship was deleted; carries the state before deletion.
    #[serde(rename = "relationship.deleted")]
    Deleted(Relationship),
    /// A relationship set was imported.
    #[serde(rename = "relationship.imported")]
    Imported {
        /// Number of relationships imported.
        count: usize,
    },
}

impl RelationshipEvent {
    /// The event name, e.g. `relationship.created`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "relationship.created",
            Self::Updated(_) => "relationship.updated",
            Self::Deleted(_) => "relationship.deleted",
            Self::Imported { .. } => "relationship.imported",
        }
    }

    /// The relationship carried by the event, if any.
    pub fn relationship(&self) -> Option<&Relationship> {
        match self {
            Self::Created(r) | Self::Updated(r) | Self::Deleted(r) => Some(r),
            Self::Imported { .. } => None,
        }
    }
}

// ============================================================================
// Sink trait
// ============================================================================

/// Destination for relationship events.
///
/// `emit` is synchronous and infallible from the caller's point of view;
/// implementations swallow their own delivery failures.
pub trait EventSink: Send + Sync {
    /// Publish an event.
    fn emit(&self, event: RelationshipEvent);
}

/// Sink that writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: RelationshipEvent) {
        match event.relationship() {
            Some(rel) => log::info!("{} {} ({})", event.name(), rel.describe(), rel.id),
            None => log::info!("{}", event.name()),
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: RelationshipEvent) {}
}

/// Sink backed by a tokio broadcast channel.
///
/// Events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<RelationshipEvent>,
}

impl BroadcastEventSink {
    /// Create a sink with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelationshipEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: RelationshipEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("event dropped: no subscribers");
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: RelationshipEvent) {
        (**self).emit(event)
    }
}

// ============================================================================
// Recording sink for testing
// ============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingEventSink;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<RelationshipEvent>>,
    }

    impl RecordingEventSink {
        /// Create an empty recorder.
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of recorded events.
        pub fn events(&self) -> Vec<RelationshipEvent> {
            self.events
                .lock()
                .map(|events| events.clone())
                .unwrap_or_default()
        }

        /// Names of recorded events, in order.
        pub fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(RelationshipEvent::name).collect()
        }
    }

    impl EventSink for RecordingEventSink {
        fn emit(&self, event: RelationshipEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{NewRelationship, RelationshipType};
    use chrono::Utc;

    fn rel() -> Relationship {
        NewRelationship::new("a", "b", RelationshipType::Supports).into_relationship(Utc::now())
    }

    #[test]
    fn test_event_names() {
        assert_eq!(RelationshipEvent::Created(rel()).name(), "relationship.created");
        assert_eq!(RelationshipEvent::Updated(rel()).name(), "relationship.updated");
        assert_eq!(RelationshipEvent::Deleted(rel()).name(), "relationship.deleted");
        assert_eq!(
            RelationshipEvent::Imported { count: 3 }.name(),
            "relationship.imported"
        );
    }

    #[test]
    fn test_event_serialization_uses_event_name() {
        let json = serde_json::to_value(RelationshipEvent::Created(rel())).unwrap();
        assert_eq!(json["event"], "relationship.created");
        assert_eq!(json["payload"]["sourceId"], "a");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingEventSink::new();
        sink.emit(RelationshipEvent::Created(rel()));
        sink.emit(RelationshipEvent::Imported { count: 1 });

        assert_eq!(
            sink.names(),
            vec!["relationship.created", "relationship.imported"]
        );
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(RelationshipEvent::Imported { count: 2 });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, RelationshipEvent::Imported { count: 2 });
    }

    #[test]
    fn test_broadcast_sink_without_subscribers_does_not_fail() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(RelationshipEvent::Imported { count: 0 });
    }
}
