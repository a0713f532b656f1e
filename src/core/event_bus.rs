// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event bus for in-process communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::invalidation::SignalEnvelope;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Invalidation,
    DataChanged,
    SystemStatus,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Invalidation(SignalEnvelope),
    DataChanged { student_id: String },
    Status { key: String, value: String },
}

/// Central event bus for pub/sub communication within one context
pub struct EventBus {
    invalidation_tx: broadcast::Sender<SignalEnvelope>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (invalidation_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            invalidation_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_invalidation(&self, envelope: SignalEnvelope) {
        let _ = self.invalidation_tx.send(envelope.clone());
        self.publish_event(EventType::Invalidation, EventPayload::Invalidation(envelope));
    }

    pub fn publish_data_changed(&self, student_id: &str) {
        self.publish_event(
            EventType::DataChanged,
            EventPayload::DataChanged {
                student_id: student_id.to_string(),
            },
        );
    }

    pub fn publish_status(&self, key: &str, value: &str) {
        self.publish_event(
            EventType::SystemStatus,
            EventPayload::Status {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<SignalEnvelope> {
        self.invalidation_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::InvalidationSignal;

    #[tokio::test]
    async fn test_events_are_numbered_in_order() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe_events();
        let mut signals = bus.subscribe_invalidations();

        bus.publish_data_changed("s1");
        bus.publish_invalidation(SignalEnvelope::new(InvalidationSignal::Clear, None));

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!((first.id, first.event_type), (0, EventType::DataChanged));
        assert_eq!((second.id, second.event_type), (1, EventType::Invalidation));
        assert_eq!(signals.recv().await.unwrap().signal, InvalidationSignal::Clear);
    }
}
