// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! TTL cache in front of the analytics computation
//!
//! Concurrent requests for the same [`Fingerprint`] share one in-flight
//! computation. Only successful results are stored; a failure is logged once
//! and turned into a minimal error result so the next call retries.

pub mod fingerprint;

pub use fingerprint::Fingerprint;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::AnalyticsResults;
use crate::config::ConfigReader;
use crate::error::{AnalyticsError, Result};

type SharedResult = Shared<BoxFuture<'static, Result<Arc<AnalyticsResults>>>>;

struct CacheEntry {
    result: Arc<AnalyticsResults>,
    computed_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.computed_at) < self.ttl
    }
}

struct InFlight {
    id: u64,
    future: SharedResult,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    in_flight: HashMap<Fingerprint, InFlight>,
    next_flight: u64,
}

impl CacheState {
    /// Live entry for `key`; an expired one is dropped
    fn live(&mut self, key: &Fingerprint, now: Instant) -> Option<Arc<AnalyticsResults>> {
        let entry = self.entries.get(key)?;
        if entry.is_live(now) {
            return Some(Arc::clone(&entry.result));
        }
        self.entries.remove(key);
        None
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Callers that attached to an already running computation
    pub joined: u64,
    pub computations: u64,
    pub failures: u64,
    pub invalidations: u64,
    /// Results dropped because their entry was invalidated mid-flight
    pub discarded: u64,
}

struct Inner {
    config: Arc<ConfigReader>,
    state: Mutex<CacheState>,
    counters: Counters,
}

/// Memoization layer for analytics results. Cheap to clone.
#[derive(Clone)]
pub struct AnalyticsCache {
    inner: Arc<Inner>,
}

impl AnalyticsCache {
    pub fn new(config: Arc<ConfigReader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(CacheState::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Live entry for `key`, if any
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<AnalyticsResults>> {
        let mut state = self.inner.state.lock();
        state.live(key, Instant::now())
    }

    /// Return the live entry for `key` or run `compute` to produce it.
    ///
    /// `compute` runs at most once for overlapping calls with the same key.
    /// Never fails: a failed computation yields [`AnalyticsResults::failed`].
    pub async fn compute_or_get<F, Fut>(&self, key: Fingerprint, compute: F) -> Arc<AnalyticsResults>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<AnalyticsResults>> + Send + 'static,
    {
        let future = {
            let mut state = self.inner.state.lock();
            if let Some(hit) = state.live(&key, Instant::now()) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                return hit;
            }

            if let Some(flight) = state.in_flight.get(&key) {
                self.inner.counters.joined.fetch_add(1, Ordering::Relaxed);
                flight.future.clone()
            } else {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                state.next_flight += 1;
                let id = state.next_flight;
                let future = self.launch(key.clone(), id, compute);
                state.in_flight.insert(
                    key.clone(),
                    InFlight {
                        id,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        match future.await {
            Ok(result) => result,
            Err(e) => Arc::new(AnalyticsResults::failed(&e)),
        }
    }

    fn launch<F, Fut>(&self, key: Fingerprint, id: u64, compute: F) -> SharedResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<AnalyticsResults>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            inner.counters.computations.fetch_add(1, Ordering::Relaxed);
            let outcome = match tokio::spawn(compute()).await {
                Ok(result) => result.map(Arc::new),
                Err(e) => Err(AnalyticsError::Computation(format!("analytics task aborted: {}", e))),
            };
            inner.settle(&key, id, &outcome);
            outcome
        }
        .boxed()
        .shared()
    }

    /// Drop every entry and abandon in-flight computations. Returns the number of entries removed.
    pub fn invalidate_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        drop(state);

        self.inner.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            info!("Invalidated all {} cached analytics results", removed);
        }
        removed
    }

    /// Drop entries for one student. Other students are untouched.
    pub fn invalidate_for_student(&self, student_id: &str) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.belongs_to(student_id));
        state.in_flight.retain(|key, _| !key.belongs_to(student_id));
        let removed = before - state.entries.len();
        drop(state);

        self.inner.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("Invalidated {} cached results for student {}", removed, student_id);
        removed
    }

    /// Remove expired entries
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.inner.state.lock();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!("Swept {} expired analytics entries", removed);
        }
        removed
    }

    /// Invalidate everything whenever the configuration changes, if the
    /// configuration asks for it. `None` when the source publishes no changes.
    pub fn watch_config(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inner.config.subscribe()?;
        let cache = self.clone();
        Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let invalidate = rx.borrow_and_update().cache.invalidate_on_config_change;
                if invalidate {
                    info!("Configuration changed, clearing analytics cache");
                    cache.invalidate_all();
                }
            }
        }))
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, in_flight) = {
            let state = self.inner.state.lock();
            (state.entries.len(), state.in_flight.len())
        };
        let c = &self.inner.counters;
        CacheStats {
            entries,
            in_flight,
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            joined: c.joined.load(Ordering::Relaxed),
            computations: c.computations.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn settle(&self, key: &Fingerprint, id: u64, outcome: &Result<Arc<AnalyticsResults>>) {
        let config = self.config.get();
        let mut state = self.state.lock();

        let current = state.in_flight.get(key).map_or(false, |f| f.id == id);
        if current {
            state.in_flight.remove(key);
        }

        match outcome {
            Ok(result) if current => {
                let max_size = config.cache.max_size.max(1);
                if !state.entries.contains_key(key) && state.entries.len() >= max_size {
                    let oldest = state
                        .entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.computed_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        state.entries.remove(&oldest);
                    }
                }
                state.entries.insert(
                    key.clone(),
                    CacheEntry {
                        result: Arc::clone(result),
                        computed_at: Instant::now(),
                        ttl: Duration::from_millis(config.cache.ttl_ms),
                    },
                );
            }
            Ok(_) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding analytics result for invalidated key {}", key);
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Analytics computation failed for {}: {}", key, e);
            }
        }
    }
}
