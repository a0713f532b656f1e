// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Analytics engine - one context's view of the analytics subsystem

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{EventBus, ProfileStore, RefreshFailure, RefreshSummary, Scheduler, StudentProfile, StudentStatus, SystemState};
use crate::analysis::{AiAnalyzer, AnalyticsResults, PatternAnalysisFacade};
use crate::cache::{AnalyticsCache, CacheStats};
use crate::config::{ConfigHandle, ConfigReader, ConfigSource};
use crate::db::{DataStorage, MemoryStorage};
use crate::error::AnalyticsError;
use crate::invalidation::{
    BroadcastHub, BroadcastTransport, InvalidationBus, InvalidationTransport, LocalTransport, SignalStore,
    StorageTransport,
};
use crate::tracking::{Goal, TrackingEntry};
use crate::worker::{AnalyticsDelegate, ComputeQueue, ThreadWorkerSpawner, WorkerCoordinator, WorkerSpawner};

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct AnalyticsOptions {
    /// Route through the AI collaborator; defaults to the `features.ai_enabled` flag
    pub use_ai: Option<bool>,
    /// Goals to use instead of the stored ones
    pub goals: Option<Vec<Goal>>,
    /// Entries to use instead of the stored ones
    pub entries: Option<Vec<TrackingEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub cache: CacheStats,
    pub pending_worker_requests: usize,
    pub queued_requests: usize,
    pub worker_running: bool,
}

/// Collaborators for an [`Engine`]; anything left unset gets an in-process default
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<Arc<dyn ConfigSource>>,
    storage: Option<Arc<dyn DataStorage>>,
    signal_store: Option<Arc<dyn SignalStore>>,
    hub: Option<Arc<BroadcastHub>>,
    spawner: Option<Arc<dyn WorkerSpawner>>,
    ai: Option<Arc<dyn AiAnalyzer>>,
}

impl EngineBuilder {
    pub fn config(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(source);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn DataStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Enables the polled storage transport for invalidation signals
    pub fn signal_store(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.signal_store = Some(store);
        self
    }

    /// Enables the broadcast transport shared with other contexts on `hub`
    pub fn broadcast_hub(mut self, hub: Arc<BroadcastHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn worker_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn ai(mut self, ai: Arc<dyn AiAnalyzer>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Build and start the engine on the current runtime
    pub async fn build(self) -> Result<Engine> {
        let source: Arc<dyn ConfigSource> = match self.config {
            Some(source) => source,
            None => Arc::new(ConfigHandle::default()),
        };
        let config = Arc::new(ConfigReader::new(source));
        let current = config.get();
        let storage: Arc<dyn DataStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(MemoryStorage::new()),
        };
        let spawner: Arc<dyn WorkerSpawner> = match self.spawner {
            Some(spawner) => spawner,
            None => Arc::new(ThreadWorkerSpawner),
        };

        let facade = match self.ai {
            Some(ai) => PatternAnalysisFacade::with_ai(ai),
            None => PatternAnalysisFacade::new(),
        };
        let delegate: Option<Arc<dyn AnalyticsDelegate>> = if facade.has_ai() {
            Some(Arc::new(facade))
        } else {
            None
        };
        let queue = Arc::new(ComputeQueue::start(
            delegate,
            Duration::from_millis(current.worker.queue_cooldown_ms),
        ));

        let cache = AnalyticsCache::new(Arc::clone(&config));
        let coordinator = WorkerCoordinator::new(cache.clone(), Arc::clone(&storage), Arc::clone(&config), queue, spawner);

        let event_bus = Arc::new(EventBus::default());
        let mut transports: Vec<Arc<dyn InvalidationTransport>> =
            vec![Arc::new(LocalTransport::new(Arc::clone(&event_bus)))];
        if let Some(hub) = &self.hub {
            transports.push(Arc::new(BroadcastTransport::new(hub)));
        }
        if let Some(store) = self.signal_store {
            transports.push(Arc::new(StorageTransport::new(
                store,
                Duration::from_millis(current.worker.signal_poll_ms.max(1)),
            )));
        }
        let invalidation = InvalidationBus::new(transports);

        let scheduler = Scheduler::new();
        let mut tasks = vec![invalidation.listen(cache.clone(), &scheduler).await];
        if let Some(watcher) = cache.watch_config() {
            tasks.push(watcher);
        }

        let sweeper = cache.clone();
        scheduler
            .add_task(
                "cache-sweep",
                Duration::from_millis(current.worker.sweep_interval_ms.max(1)),
                move || {
                    sweeper.sweep_expired();
                },
            )
            .await;

        let engine = Engine {
            config,
            storage,
            cache,
            coordinator,
            invalidation,
            event_bus,
            scheduler,
            profiles: ProfileStore::new(),
            tasks: Mutex::new(tasks),
            state: Arc::new(RwLock::new(SystemState {
                running: true,
                ..Default::default()
            })),
            start_time: Instant::now(),
        };
        engine.event_bus.publish_status("engine", "started");
        info!("Analytics engine started (context {})", engine.invalidation.origin());
        Ok(engine)
    }
}

/// Main analytics engine
pub struct Engine {
    config: Arc<ConfigReader>,
    storage: Arc<dyn DataStorage>,
    cache: AnalyticsCache,
    coordinator: WorkerCoordinator,
    invalidation: InvalidationBus,
    event_bus: Arc<EventBus>,
    scheduler: Scheduler,
    profiles: ProfileStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<RwLock<SystemState>>,
    start_time: Instant,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Analytics for one student. Never fails; problems surface in `error` and `insights`.
    pub async fn student_analytics(&self, student_id: &str, options: AnalyticsOptions) -> Arc<AnalyticsResults> {
        let config = self.config.get();
        let use_ai = options.use_ai.unwrap_or(config.features.ai_enabled);
        self.profiles.initialize(student_id);

        let entries = match options.entries {
            Some(entries) => entries,
            None => match self.storage.entries_for_student(student_id).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Could not load entries for {}: {}", student_id, e);
                    return Arc::new(AnalyticsResults::failed(&e));
                }
            },
        };

        let results = self
            .coordinator
            .analytics_for(student_id, entries, options.goals, use_ai)
            .await;
        let score = self.profiles.record(student_id, &results, &config.health_score);
        debug!("Health score for {}: {}", student_id, score);

        let mut state = self.state.write().await;
        state.analyses_served += 1;
        state.last_analysis = Some(Utc::now());
        results
    }

    /// Announce that a student's entries or goals were written
    pub async fn notify_data_changed(&self, student_id: &str) {
        self.event_bus.publish_data_changed(student_id);
        self.invalidation.notify_data_changed(student_id);
        self.state.write().await.data_changes += 1;
    }

    /// Announce that a student was deleted
    pub async fn notify_student_deleted(&self, student_id: &str) {
        info!("Student {} deleted, invalidating analytics", student_id);
        self.profiles.remove(student_id);
        self.notify_data_changed(student_id).await;
    }

    /// Create the student's profile ahead of its first analysis; false if it already exists
    pub fn initialize_student(&self, student_id: &str) -> bool {
        self.profiles.initialize(student_id)
    }

    pub fn profile(&self, student_id: &str) -> Option<StudentProfile> {
        self.profiles.get(student_id)
    }

    /// Drop one student's cached results and analyze them again
    pub async fn refresh_student(&self, student_id: &str) -> crate::error::Result<Arc<AnalyticsResults>> {
        if student_id.trim().is_empty() {
            return Err(AnalyticsError::InvalidInput("student id is empty".to_string()));
        }
        let dropped = self.cache.invalidate_for_student(student_id);
        debug!("Refreshing {} ({} cached results dropped)", student_id, dropped);

        let results = self.student_analytics(student_id, AnalyticsOptions::default()).await;
        match &results.error {
            Some(e) => Err(AnalyticsError::Computation(e.clone())),
            None => Ok(results),
        }
    }

    /// Refresh every stored student concurrently. One student's failure does not stop the rest.
    pub async fn refresh_all(&self) -> crate::error::Result<RefreshSummary> {
        let students = self.storage.students().await?;
        let outcomes = futures::future::join_all(students.iter().map(|id| async move {
            self.profiles.initialize(id);
            (id, self.refresh_student(id).await)
        }))
        .await;

        let mut summary = RefreshSummary::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(_) => summary.refreshed.push(id.clone()),
                Err(e) => {
                    error!("Failed to refresh analytics for {}: {}", id, e);
                    summary.failed.push(RefreshFailure {
                        student_id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            "Refreshed analytics for {} of {} students",
            summary.refreshed.len(),
            students.len()
        );
        Ok(summary)
    }

    /// Profile status for every stored student
    pub async fn status(&self) -> crate::error::Result<Vec<StudentStatus>> {
        let students = self.storage.students().await?;
        Ok(students.iter().map(|id| self.profiles.status(id)).collect())
    }

    pub fn cache(&self) -> &AnalyticsCache {
        &self.cache
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats(),
            pending_worker_requests: self.coordinator.pending_requests(),
            queued_requests: self.coordinator.queued_requests(),
            worker_running: self.coordinator.worker_running(),
        }
    }

    pub async fn state(&self) -> SystemState {
        let mut state = self.state.read().await.clone();
        state.uptime_seconds = self.uptime();
        state
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Stop background tasks, the worker and the queue, and drop cached results
    pub async fn shutdown(&self) {
        info!("Stopping analytics engine...");
        self.scheduler.shutdown().await;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.coordinator.shutdown();
        self.cache.invalidate_all();
        self.state.write().await.running = false;
        self.event_bus.publish_status("engine", "stopped");
        info!("Analytics engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_entries;
    use crate::config::Config;
    use crate::core::health_score;
    use async_trait::async_trait;

    /// Storage whose entry reads fail for one student
    struct FlakyStorage {
        inner: MemoryStorage,
        broken: &'static str,
    }

    #[async_trait]
    impl DataStorage for FlakyStorage {
        async fn entries_for_student(&self, student_id: &str) -> crate::error::Result<Vec<TrackingEntry>> {
            if student_id == self.broken {
                return Err(AnalyticsError::Storage("disk read failed".into()));
            }
            self.inner.entries_for_student(student_id).await
        }

        async fn goals_for_student(&self, student_id: &str) -> crate::error::Result<Vec<Goal>> {
            self.inner.goals_for_student(student_id).await
        }

        async fn students(&self) -> crate::error::Result<Vec<String>> {
            self.inner.students().await
        }
    }

    async fn engine_with(storage: Arc<MemoryStorage>, hub: Arc<BroadcastHub>) -> Engine {
        Engine::builder()
            .storage(storage.clone())
            .signal_store(storage)
            .broadcast_hub(hub)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_analytics_are_cached_until_data_changes() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_entries(sample_entries("s1", 10));
        let engine = engine_with(storage.clone(), Arc::new(BroadcastHub::new())).await;

        let first = engine.student_analytics("s1", AnalyticsOptions::default()).await;
        let second = engine.student_analytics("s1", AnalyticsOptions::default()).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.error.is_none());

        let mut extra = sample_entries("s1", 11).pop().unwrap();
        extra.id = "s1-extra".into();
        storage.add_entries(vec![extra]);
        let mut events = engine.event_bus().subscribe_events();
        engine.notify_data_changed("s1").await;
        let announced = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e.payload, crate::core::EventPayload::DataChanged { ref student_id } if student_id == "s1"));
        assert!(announced);
        for _ in 0..100 {
            if engine.cache().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let third = engine.student_analytics("s1", AnalyticsOptions::default()).await;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(engine.state().await.analyses_served, 3);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_deletion_in_one_context_reaches_another() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_entries(sample_entries("s1", 6));
        storage.add_entries(sample_entries("s2", 6));
        let hub = Arc::new(BroadcastHub::new());
        let viewer = engine_with(storage.clone(), Arc::clone(&hub)).await;
        let editor = engine_with(storage.clone(), hub).await;

        viewer.student_analytics("s1", AnalyticsOptions::default()).await;
        viewer.student_analytics("s2", AnalyticsOptions::default()).await;
        assert_eq!(viewer.cache().len(), 2);

        storage.remove_student("s1");
        editor.notify_student_deleted("s1").await;
        for _ in 0..100 {
            if viewer.cache().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(viewer.cache().is_empty());

        viewer.shutdown().await;
        editor.shutdown().await;
    }

    #[tokio::test]
    async fn test_profile_follows_each_analysis() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_entries(sample_entries("s1", 10));
        let engine = Engine::builder().storage(storage).build().await.unwrap();

        assert!(engine.profile("s1").is_none());
        assert!(engine.initialize_student("s1"));
        assert!(!engine.initialize_student("s1"));
        assert!(!engine.initialize_student(""));
        assert!(engine.profile("s1").unwrap().last_analyzed_at.is_none());

        let results = engine.student_analytics("s1", AnalyticsOptions::default()).await;
        let profile = engine.profile("s1").unwrap();
        assert!(profile.last_analyzed_at.is_some());
        assert_eq!(profile.health_score, health_score(&results, &Config::default().health_score));

        engine.notify_student_deleted("s1").await;
        assert!(engine.profile("s1").is_none());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_student_recomputes() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_entries(sample_entries("s1", 8));
        let engine = Engine::builder().storage(storage).build().await.unwrap();

        let first = engine.student_analytics("s1", AnalyticsOptions::default()).await;
        let refreshed = engine.refresh_student("s1").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert!(refreshed.error.is_none());
        assert_eq!(engine.state().await.analyses_served, 2);

        assert!(matches!(engine.refresh_student(" ").await, Err(AnalyticsError::InvalidInput(_))));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_all_tolerates_failures() {
        let inner = MemoryStorage::new();
        for student in ["s1", "s2", "broken"] {
            inner.add_entries(sample_entries(student, 6));
        }
        let storage = Arc::new(FlakyStorage { inner, broken: "broken" });
        let engine = Engine::builder().storage(storage).build().await.unwrap();

        let mut summary = engine.refresh_all().await.unwrap();
        summary.refreshed.sort();
        assert_eq!(summary.refreshed, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].student_id, "broken");

        let status = engine.status().await.unwrap();
        assert_eq!(status.len(), 3);
        for row in &status {
            assert!(row.is_initialized);
            assert_eq!(row.last_analyzed.is_some(), row.student_id != "broken");
        }
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_student_gets_neutral_result() {
        let engine = Engine::builder().build().await.unwrap();
        let results = engine.student_analytics("nobody", AnalyticsOptions::default()).await;
        assert!(results.is_empty());
        assert!(results.error.is_none());
        assert!(results.insights[0].starts_with("Limited data available"));
        assert_eq!(engine.stats().pending_worker_requests, 0);
        engine.shutdown().await;
    }
}
