// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Delivery channels for invalidation signals
//!
//! Each transport delivers at least once; listeners dedupe by envelope id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{InvalidationSignal, SignalEnvelope};
use crate::core::{EventBus, Scheduler};
use crate::error::Result;

/// Key for the global signal in a [`SignalStore`]
pub const GLOBAL_SIGNAL_KEY: &str = "analytics:cache:signal";
/// Key for the student-scoped signal in a [`SignalStore`].
///
/// One slot holds the latest student signal only. Two student signals between
/// polls keep just the second, which is safe while every data change also
/// publishes a global clear (see [`super::InvalidationBus::notify_data_changed`]).
pub const STUDENT_SIGNAL_KEY: &str = "analytics:cache:signal:student";

#[async_trait]
pub trait InvalidationTransport: Send + Sync {
    fn name(&self) -> &'static str;

    fn publish(&self, envelope: &SignalEnvelope) -> Result<()>;

    /// Forward received signals into `sink` until the transport closes
    async fn attach(&self, sink: mpsc::UnboundedSender<SignalEnvelope>, scheduler: &Scheduler) -> Option<JoinHandle<()>>;
}

/// Same-context delivery over the [`EventBus`]
pub struct LocalTransport {
    bus: Arc<EventBus>,
}

impl LocalTransport {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl InvalidationTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    fn publish(&self, envelope: &SignalEnvelope) -> Result<()> {
        self.bus.publish_invalidation(envelope.clone());
        Ok(())
    }

    async fn attach(&self, sink: mpsc::UnboundedSender<SignalEnvelope>, _: &Scheduler) -> Option<JoinHandle<()>> {
        let rx = self.bus.subscribe_invalidations();
        Some(tokio::spawn(forward(rx, sink, Some)))
    }
}

/// Named broadcast channels shared by every context in the process
#[derive(Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, name: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

/// Cross-context delivery of JSON messages on a named hub channel.
///
/// Anything that can post `{"type":"clear"}` or
/// `{"type":"clear-student","studentId":"..."}` on the channel is honored.
pub struct BroadcastTransport {
    tx: broadcast::Sender<String>,
}

impl BroadcastTransport {
    pub const CHANNEL: &'static str = "analytics-cache";

    pub fn new(hub: &BroadcastHub) -> Self {
        Self {
            tx: hub.channel(Self::CHANNEL),
        }
    }
}

#[async_trait]
impl InvalidationTransport for BroadcastTransport {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn publish(&self, envelope: &SignalEnvelope) -> Result<()> {
        let message = serde_json::to_string(envelope)?;
        // No receivers is not an error
        let _ = self.tx.send(message);
        Ok(())
    }

    async fn attach(&self, sink: mpsc::UnboundedSender<SignalEnvelope>, _: &Scheduler) -> Option<JoinHandle<()>> {
        let rx = self.tx.subscribe();
        Some(tokio::spawn(forward(rx, sink, |message: String| {
            match serde_json::from_str::<SignalEnvelope>(&message) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    debug!("Ignoring malformed cache signal {}: {}", message, e);
                    None
                }
            }
        })))
    }
}

async fn forward<T, F>(mut rx: broadcast::Receiver<T>, sink: mpsc::UnboundedSender<SignalEnvelope>, parse: F)
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Option<SignalEnvelope> + Send + 'static,
{
    loop {
        let envelope = match rx.recv().await {
            Ok(message) => match parse(message) {
                Some(envelope) => envelope,
                None => continue,
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Missed {} cache signals, clearing everything", missed);
                SignalEnvelope::new(InvalidationSignal::Clear, None)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if sink.send(envelope).is_err() {
            break;
        }
    }
}

/// Persistent key-value store visible to every context
pub trait SignalStore: Send + Sync {
    fn write_signal(&self, key: &str, value: &str) -> Result<()>;

    fn read_signal(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student_id: Option<String>,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<Uuid>,
}

/// Fallback delivery through a polled [`SignalStore`]
pub struct StorageTransport {
    store: Arc<dyn SignalStore>,
    poll: Duration,
}

impl StorageTransport {
    pub fn new(store: Arc<dyn SignalStore>, poll: Duration) -> Self {
        Self { store, poll }
    }
}

/// Turn a stored value into an envelope. Legacy writers store a bare timestamp.
fn decode_stored(key: &str, raw: &str) -> Option<SignalEnvelope> {
    let stored = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(_)) => serde_json::from_str::<StoredSignal>(raw).ok()?,
        _ => StoredSignal {
            student_id: None,
            timestamp: raw.trim().parse().ok()?,
            id: None,
            origin: None,
        },
    };

    let signal = if key == STUDENT_SIGNAL_KEY {
        InvalidationSignal::ClearStudent {
            student_id: stored.student_id?,
        }
    } else {
        InvalidationSignal::Clear
    };
    Some(SignalEnvelope {
        id: stored.id,
        origin: stored.origin,
        signal,
    })
}

#[async_trait]
impl InvalidationTransport for StorageTransport {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn publish(&self, envelope: &SignalEnvelope) -> Result<()> {
        let (key, student_id) = match &envelope.signal {
            InvalidationSignal::Clear => (GLOBAL_SIGNAL_KEY, None),
            InvalidationSignal::ClearStudent { student_id } => (STUDENT_SIGNAL_KEY, Some(student_id.clone())),
        };
        let stored = StoredSignal {
            student_id,
            timestamp: Utc::now().timestamp_millis(),
            id: envelope.id,
            origin: envelope.origin,
        };
        self.store.write_signal(key, &serde_json::to_string(&stored)?)
    }

    async fn attach(&self, sink: mpsc::UnboundedSender<SignalEnvelope>, scheduler: &Scheduler) -> Option<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let keys = [GLOBAL_SIGNAL_KEY, STUDENT_SIGNAL_KEY];

        // Signals written before we attached are history, not news
        let baseline: HashMap<&'static str, Option<String>> = keys
            .iter()
            .map(|key| (*key, store.read_signal(key).ok().flatten()))
            .collect();
        let last_seen = Mutex::new(baseline);

        scheduler
            .add_task("invalidation-storage-poll", self.poll, move || {
                let mut last_seen = last_seen.lock();
                for key in keys {
                    let current = match store.read_signal(key) {
                        Ok(value) => value,
                        Err(e) => {
                            debug!("Could not read cache signal {}: {}", key, e);
                            continue;
                        }
                    };
                    if last_seen.get(key) == Some(&current) {
                        continue;
                    }
                    if let Some(envelope) = current.as_deref().and_then(|raw| decode_stored(key, raw)) {
                        if sink.send(envelope).is_err() {
                            debug!("Invalidation listener gone, dropping stored signal {}", key);
                        }
                    }
                    last_seen.insert(key, current);
                }
            })
            .await;
        None
    }
}
