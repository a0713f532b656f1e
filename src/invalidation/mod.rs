// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Cross-context cache invalidation
//!
//! A data change is announced on every configured transport. Listeners treat
//! the copies as one signal: envelopes are deduplicated by id and applying a
//! signal twice is harmless anyway.

pub mod transport;

pub use transport::{
    BroadcastHub, BroadcastTransport, InvalidationTransport, LocalTransport, SignalStore, StorageTransport,
    GLOBAL_SIGNAL_KEY, STUDENT_SIGNAL_KEY,
};

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::AnalyticsCache;
use crate::core::Scheduler;

const SEEN_CAPACITY: usize = 512;

/// Public wire form: `{"type":"clear"}` or `{"type":"clear-student","studentId":"..."}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InvalidationSignal {
    Clear,
    ClearStudent {
        #[serde(rename = "studentId")]
        student_id: String,
    },
}

/// A signal plus the identifiers used for deduplication. Both are optional so
/// bare signals from other emitters are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
    #[serde(flatten)]
    pub signal: InvalidationSignal,
}

impl SignalEnvelope {
    pub fn new(signal: InvalidationSignal, origin: Option<Uuid>) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            origin,
            signal,
        }
    }
}

/// Publishes invalidation signals on every transport and applies received ones to a cache
pub struct InvalidationBus {
    origin: Uuid,
    transports: Vec<Arc<dyn InvalidationTransport>>,
}

impl InvalidationBus {
    pub fn new(transports: Vec<Arc<dyn InvalidationTransport>>) -> Self {
        Self {
            origin: Uuid::new_v4(),
            transports,
        }
    }

    /// Identifier of this context
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Send `signal` on every transport. A failing transport does not stop the others.
    pub fn publish(&self, signal: InvalidationSignal) -> SignalEnvelope {
        let envelope = SignalEnvelope::new(signal, Some(self.origin));
        for transport in &self.transports {
            if let Err(e) = transport.publish(&envelope) {
                warn!("Invalidation transport '{}' failed: {}", transport.name(), e);
            }
        }
        envelope
    }

    /// Announce a write or delete for `student_id`
    pub fn notify_data_changed(&self, student_id: &str) {
        debug!("Announcing data change for {}", student_id);
        self.publish(InvalidationSignal::Clear);
        self.publish(InvalidationSignal::ClearStudent {
            student_id: student_id.to_string(),
        });
    }

    /// Apply signals from every transport to `cache`
    pub async fn listen(&self, cache: AnalyticsCache, scheduler: &Scheduler) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut forwarders = Vec::new();
        for transport in &self.transports {
            if let Some(handle) = transport.attach(tx.clone(), scheduler).await {
                forwarders.push(handle);
            }
        }
        drop(tx);

        tokio::spawn(async move {
            let mut seen = SeenIds::default();
            while let Some(envelope) = rx.recv().await {
                if let Some(id) = envelope.id {
                    if !seen.insert(id) {
                        continue;
                    }
                }
                match envelope.signal {
                    InvalidationSignal::Clear => {
                        cache.invalidate_all();
                    }
                    InvalidationSignal::ClearStudent { student_id } => {
                        cache.invalidate_for_student(&student_id);
                    }
                }
            }
            for handle in forwarders {
                handle.abort();
            }
        })
    }
}

/// Bounded set of recently applied envelope ids
#[derive(Default)]
struct SeenIds {
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl SeenIds {
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }
}
