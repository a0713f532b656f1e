// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Background computation
//!
//! [`WorkerCoordinator`] multiplexes analysis requests onto one long-lived
//! background thread, correlating replies by cache key. Anything that goes
//! wrong on that path (spawn failure, closed channel, error reply, timeout)
//! reroutes the request through the in-process [`ComputeQueue`].

pub mod protocol;
pub mod queue;
pub mod thread;

pub use protocol::{WorkerMessage, WorkerPayload, WorkerRequest};
pub use queue::{AnalyticsDelegate, ComputeQueue};
pub use thread::{ThreadWorkerSpawner, WorkerHandle, WorkerSpawner};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{normalize_results, AnalyticsResults};
use crate::cache::{AnalyticsCache, Fingerprint};
use crate::config::{Config, ConfigReader};
use crate::db::DataStorage;
use crate::error::{AnalyticsError, Result};
use crate::tracking::{AnalysisInput, Goal, TrackingEntry};

type LeaderReply = oneshot::Sender<Result<AnalyticsResults>>;

struct PendingRequest {
    id: u64,
    leader: Option<LeaderReply>,
    followers: Vec<oneshot::Sender<AnalyticsResults>>,
    heartbeat: Arc<Notify>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingRequest>>>;

struct WorkerLink {
    handle: Box<dyn WorkerHandle>,
    dispatcher: JoinHandle<()>,
}

enum Role {
    Leader {
        id: u64,
        reply: oneshot::Receiver<Result<AnalyticsResults>>,
        heartbeat: Arc<Notify>,
    },
    Follower(oneshot::Receiver<AnalyticsResults>),
}

struct CoordinatorInner {
    cache: AnalyticsCache,
    storage: Arc<dyn DataStorage>,
    config: Arc<ConfigReader>,
    queue: Arc<ComputeQueue>,
    spawner: Arc<dyn WorkerSpawner>,
    link: Mutex<Option<WorkerLink>>,
    pending: PendingTable,
    next_request: AtomicU64,
    degradation_logged: AtomicBool,
}

/// Cache-fronted entry point for analytics
#[derive(Clone)]
pub struct WorkerCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl WorkerCoordinator {
    pub fn new(
        cache: AnalyticsCache,
        storage: Arc<dyn DataStorage>,
        config: Arc<ConfigReader>,
        queue: Arc<ComputeQueue>,
        spawner: Arc<dyn WorkerSpawner>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                storage,
                config,
                queue,
                spawner,
                link: Mutex::new(None),
                pending: Arc::new(Mutex::new(HashMap::new())),
                next_request: AtomicU64::new(0),
                degradation_logged: AtomicBool::new(false),
            }),
        }
    }

    pub fn cache(&self) -> &AnalyticsCache {
        &self.inner.cache
    }

    /// Analytics for a student's entries.
    ///
    /// Goals are fetched from storage when not supplied so that goal changes
    /// reach the fingerprint. AI-routed requests skip the worker thread.
    pub async fn analytics_for(
        &self,
        student_id: &str,
        entries: Vec<TrackingEntry>,
        goals: Option<Vec<Goal>>,
        use_ai: bool,
    ) -> Arc<AnalyticsResults> {
        let config = self.inner.config.get();

        let goals = match goals {
            Some(goals) => goals,
            None => match self.inner.storage.goals_for_student(student_id).await {
                Ok(goals) => goals,
                Err(e) => {
                    warn!("Could not load goals for {}: {}", student_id, e);
                    Vec::new()
                }
            },
        };

        let input = AnalysisInput::from_entries(student_id, entries, goals);
        let key = match Fingerprint::compute(&input, &config, use_ai) {
            Ok(key) => key,
            Err(e) => return Arc::new(AnalyticsResults::failed(&e)),
        };

        let inner = Arc::clone(&self.inner);
        let cache_key = key.to_string();
        self.inner
            .cache
            .compute_or_get(key, move || async move { inner.compute(cache_key, input, config, use_ai).await })
            .await
    }

    /// Requests awaiting a worker reply
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Requests waiting in the fallback queue
    pub fn queued_requests(&self) -> usize {
        self.inner.queue.pending()
    }

    pub fn worker_running(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    /// Stop the worker and the fallback queue. Outstanding callers resolve with an error result.
    pub fn shutdown(&self) {
        self.inner.stop_worker();
        self.inner.pending.lock().clear();
        self.inner.queue.shutdown();
        info!("Analytics coordinator shut down");
    }
}

impl CoordinatorInner {
    async fn compute(&self, key: String, input: AnalysisInput, config: Arc<Config>, use_ai: bool) -> Result<AnalyticsResults> {
        if use_ai {
            return self.queue.submit(input, config, true).await;
        }

        match self.role(&key) {
            Role::Follower(rx) => match rx.await {
                Ok(results) => Ok(results),
                Err(_) => self.fallback(&key, input, config).await,
            },
            Role::Leader { id, reply, heartbeat } => {
                match self.run_on_worker(&key, &input, &config, reply, heartbeat).await {
                    Ok(results) => Ok(results),
                    Err(e) => {
                        self.log_degradation(&e);
                        let followers = self.take_followers(&key, id);
                        let results = self.fallback(&key, input, config).await?;
                        for follower in followers {
                            if follower.send(results.clone()).is_err() {
                                debug!("Follower of {} went away before the fallback finished", key);
                            }
                        }
                        Ok(results)
                    }
                }
            }
        }
    }

    fn role(&self, key: &str) -> Role {
        let mut pending = self.pending.lock();
        if let Some(request) = pending.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            request.followers.push(tx);
            debug!("Attached to pending worker request {}", key);
            return Role::Follower(rx);
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, reply) = oneshot::channel();
        let heartbeat = Arc::new(Notify::new());
        pending.insert(
            key.to_string(),
            PendingRequest {
                id,
                leader: Some(tx),
                followers: Vec::new(),
                heartbeat: Arc::clone(&heartbeat),
            },
        );
        Role::Leader { id, reply, heartbeat }
    }

    async fn run_on_worker(
        &self,
        key: &str,
        input: &AnalysisInput,
        config: &Arc<Config>,
        mut reply: oneshot::Receiver<Result<AnalyticsResults>>,
        heartbeat: Arc<Notify>,
    ) -> Result<AnalyticsResults> {
        let request = WorkerRequest {
            cache_key: key.to_string(),
            payload: WorkerPayload {
                inputs: input.clone(),
                config: (**config).clone(),
            },
        };
        self.post(request)?;

        let timeout = Duration::from_millis(config.worker.effective_timeout_ms());
        loop {
            tokio::select! {
                outcome = &mut reply => {
                    return outcome.map_err(|_| AnalyticsError::Transport("worker reply channel closed".to_string()))?;
                }
                _ = heartbeat.notified() => {
                    continue;
                }
                _ = tokio::time::sleep(timeout) => {
                    // A stalled worker is stopped by the last request waiting on it
                    if self.others_pending(key) {
                        debug!("Worker timed out on {}, leaving it up for other requests", key);
                    } else {
                        self.stop_worker();
                    }
                    return Err(AnalyticsError::Timeout(timeout.as_millis() as u64));
                }
            }
        }
    }

    /// Post to the worker, spawning it on first use
    fn post(&self, request: WorkerRequest) -> Result<()> {
        let mut link = self.link.lock();
        if link.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = self.spawner.spawn(tx)?;
            let dispatcher = tokio::spawn(dispatch(rx, Arc::clone(&self.pending)));
            *link = Some(WorkerLink { handle, dispatcher });
        }

        let result = match link.as_ref() {
            Some(worker) => worker.handle.post(request),
            None => Err(AnalyticsError::Transport("analytics worker unavailable".to_string())),
        };
        if result.is_err() {
            if let Some(worker) = link.take() {
                worker.handle.terminate();
            }
        }
        result
    }

    fn stop_worker(&self) {
        if let Some(worker) = self.link.lock().take() {
            worker.handle.terminate();
            // The dispatcher ends once the worker drops its reply sender
            drop(worker.dispatcher);
        }
    }

    fn others_pending(&self, key: &str) -> bool {
        self.pending.lock().keys().any(|k| k != key)
    }

    /// Remove our pending entry, returning callers attached to it
    fn take_followers(&self, key: &str, id: u64) -> Vec<oneshot::Sender<AnalyticsResults>> {
        let mut pending = self.pending.lock();
        match pending.get(key) {
            Some(request) if request.id == id => pending.remove(key).map(|r| r.followers).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn fallback(&self, key: &str, input: AnalysisInput, config: Arc<Config>) -> Result<AnalyticsResults> {
        debug!("Computing {} on the fallback queue", key);
        self.queue.submit(input, config, false).await
    }

    fn log_degradation(&self, error: &AnalyticsError) {
        if !self.degradation_logged.swap(true, Ordering::Relaxed) {
            warn!("Analytics worker unavailable, using in-process queue: {}", error);
        } else {
            debug!("Analytics worker path failed: {}", error);
        }
    }
}

/// Route worker replies to the pending request with the same cache key
async fn dispatch(mut rx: mpsc::UnboundedReceiver<WorkerMessage>, pending: PendingTable) {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Progress { cache_key, .. } => {
                let pending = pending.lock();
                match cache_key.as_deref().and_then(|k| pending.get(k)) {
                    Some(request) => request.heartbeat.notify_one(),
                    None if cache_key.is_none() => pending.values().for_each(|r| r.heartbeat.notify_one()),
                    None => {}
                }
            }
            WorkerMessage::Complete { cache_key, payload } => {
                let results = normalize_results(payload);
                if let Some(error) = &results.error {
                    // Followers stay attached and receive the leader's fallback
                    fail_leader(&pending, &cache_key, AnalyticsError::Computation(error.clone()));
                    continue;
                }
                let Some(mut request) = pending.lock().remove(&cache_key) else {
                    debug!("Dropping late worker reply for {}", cache_key);
                    continue;
                };
                if let Some(leader) = request.leader.take() {
                    if leader.send(Ok(results.clone())).is_err() {
                        debug!("Worker reply for {} arrived after its caller went away", cache_key);
                    }
                }
                for follower in request.followers {
                    if follower.send(results.clone()).is_err() {
                        debug!("Follower of {} went away before the reply", cache_key);
                    }
                }
            }
            WorkerMessage::Error { cache_key, error } => {
                fail_leader(&pending, &cache_key, AnalyticsError::Computation(error));
            }
        }
    }
    debug!("Worker dispatcher stopped");
}

fn fail_leader(pending: &PendingTable, cache_key: &str, error: AnalyticsError) {
    let leader = pending.lock().get_mut(cache_key).and_then(|r| r.leader.take());
    match leader {
        Some(leader) => {
            if leader.send(Err(error)).is_err() {
                debug!("Worker error for {} arrived after its caller went away", cache_key);
            }
        }
        None => debug!("Dropping late worker error for {}", cache_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_entries;
    use crate::analysis::PatternAnalysisFacade;
    use crate::config::{ConfigHandle, ConfigSource};
    use crate::db::MemoryStorage;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FailingSpawner;

    impl WorkerSpawner for FailingSpawner {
        fn spawn(&self, _: mpsc::UnboundedSender<WorkerMessage>) -> Result<Box<dyn WorkerHandle>> {
            Err(AnalyticsError::Transport("threads unavailable".into()))
        }
    }

    /// Worker driven by a script of (delay, reply) steps per request
    struct ScriptedSpawner {
        script: Vec<(u64, &'static str)>,
        posts: Arc<AtomicUsize>,
        terminated: Arc<AtomicBool>,
    }

    struct ScriptedHandle {
        script: Vec<(u64, &'static str)>,
        replies: mpsc::UnboundedSender<WorkerMessage>,
        posts: Arc<AtomicUsize>,
        terminated: Arc<AtomicBool>,
    }

    impl WorkerSpawner for ScriptedSpawner {
        fn spawn(&self, replies: mpsc::UnboundedSender<WorkerMessage>) -> Result<Box<dyn WorkerHandle>> {
            Ok(Box::new(ScriptedHandle {
                script: self.script.clone(),
                replies,
                posts: Arc::clone(&self.posts),
                terminated: Arc::clone(&self.terminated),
            }))
        }
    }

    impl WorkerHandle for ScriptedHandle {
        fn post(&self, request: WorkerRequest) -> Result<()> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            let script = self.script.clone();
            let replies = self.replies.clone();
            let key = request.cache_key;
            tokio::spawn(async move {
                for (delay, step) in script {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let message = match step {
                        "progress" => WorkerMessage::Progress {
                            cache_key: Some(key.clone()),
                            stage: None,
                        },
                        "error" => WorkerMessage::Error {
                            cache_key: key.clone(),
                            error: "worker crashed".into(),
                        },
                        "garbage" => WorkerMessage::Complete {
                            cache_key: key.clone(),
                            payload: json!("garbage"),
                        },
                        _ => WorkerMessage::Complete {
                            cache_key: key.clone(),
                            payload: json!({"insights": ["from worker"]}),
                        },
                    };
                    let _ = replies.send(message);
                }
            });
            Ok(())
        }

        fn terminate(&self) {
            self.terminated.store(true, Ordering::SeqCst);
        }
    }

    struct Fixture {
        coordinator: WorkerCoordinator,
        storage: Arc<MemoryStorage>,
        posts: Arc<AtomicUsize>,
        terminated: Arc<AtomicBool>,
    }

    fn fixture(spawner: Option<Vec<(u64, &'static str)>>) -> Fixture {
        let handle: Arc<dyn ConfigSource> = Arc::new(ConfigHandle::default());
        let config = Arc::new(ConfigReader::new(handle));
        let storage = Arc::new(MemoryStorage::new());
        let posts = Arc::new(AtomicUsize::new(0));
        let terminated = Arc::new(AtomicBool::new(false));
        let spawner: Arc<dyn WorkerSpawner> = match spawner {
            Some(script) => Arc::new(ScriptedSpawner {
                script,
                posts: Arc::clone(&posts),
                terminated: Arc::clone(&terminated),
            }),
            None => Arc::new(ThreadWorkerSpawner),
        };
        let queue = Arc::new(ComputeQueue::start(None, Duration::from_millis(1)));
        let coordinator = WorkerCoordinator::new(
            AnalyticsCache::new(Arc::clone(&config)),
            storage.clone(),
            config,
            queue,
            spawner,
        );
        Fixture {
            coordinator,
            storage,
            posts,
            terminated,
        }
    }

    fn fixture_with(spawner: Arc<dyn WorkerSpawner>) -> WorkerCoordinator {
        let handle: Arc<dyn ConfigSource> = Arc::new(ConfigHandle::default());
        let config = Arc::new(ConfigReader::new(handle));
        WorkerCoordinator::new(
            AnalyticsCache::new(Arc::clone(&config)),
            Arc::new(MemoryStorage::new()),
            config,
            Arc::new(ComputeQueue::start(None, Duration::from_millis(1))),
            spawner,
        )
    }

    fn section_shape(results: &AnalyticsResults) -> Vec<(String, usize)> {
        let value = serde_json::to_value(results).unwrap();
        let mut shape: Vec<(String, usize)> = value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_array().map_or(0, |a| a.len())))
            .collect();
        shape.sort();
        shape
    }

    #[tokio::test]
    async fn test_thread_and_fallback_paths_agree() {
        let entries = sample_entries("s1", 12);
        let threaded = fixture(None).coordinator;
        let fallback = fixture_with(Arc::new(FailingSpawner));

        let a = threaded.analytics_for("s1", entries.clone(), Some(vec![]), false).await;
        let b = fallback.analytics_for("s1", entries.clone(), Some(vec![]), false).await;

        assert!(threaded.worker_running());
        assert!(!fallback.worker_running());
        assert_eq!(section_shape(&a), section_shape(&b));
        assert_eq!(a.insights, b.insights);
        assert!(a.error.is_none() && b.error.is_none());

        let direct = PatternAnalysisFacade::new().analyze(
            &AnalysisInput::from_entries("s1", entries, vec![]),
            &Config::default(),
        );
        assert_eq!(*b, direct);
        threaded.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_rearms_timeout() {
        // Each gap is inside the default timeout, the total is not
        let f = fixture(Some(vec![(4_000, "progress"), (4_000, "progress"), (4_000, "progress"), (4_000, "complete")]));
        let results = f.coordinator.analytics_for("s1", sample_entries("s1", 6), Some(vec![]), false).await;

        assert_eq!(results.insights, vec!["from worker".to_string()]);
        assert!(!f.terminated.load(Ordering::SeqCst));
        assert_eq!(f.coordinator.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_times_out_to_fallback() {
        let f = fixture(Some(vec![(60_000, "complete")]));
        let entries = sample_entries("s1", 6);
        let results = f.coordinator.analytics_for("s1", entries.clone(), Some(vec![]), false).await;

        assert_ne!(results.insights, vec!["from worker".to_string()]);
        assert!(results.error.is_none());
        assert!(f.terminated.load(Ordering::SeqCst));
        assert_eq!(f.coordinator.pending_requests(), 0);

        // The late reply finds nothing pending and is dropped
        tokio::time::sleep(Duration::from_secs(90)).await;
        let cached = f.coordinator.analytics_for("s1", entries, Some(vec![]), false).await;
        assert!(Arc::ptr_eq(&results, &cached));
    }

    #[tokio::test]
    async fn test_error_reply_falls_back() {
        let f = fixture(Some(vec![(1, "error")]));
        let results = f.coordinator.analytics_for("s1", sample_entries("s1", 6), Some(vec![]), false).await;
        assert!(results.error.is_none());
        assert!(!results.insights.is_empty());
        assert_ne!(results.insights, vec!["from worker".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back_and_caches_fallback() {
        let f = fixture(Some(vec![(1, "garbage")]));
        let entries = sample_entries("s1", 6);

        let first = f.coordinator.analytics_for("s1", entries.clone(), Some(vec![]), false).await;
        assert!(first.error.is_none());
        assert!(!first.insights.is_empty());
        assert_ne!(first.insights, vec!["from worker".to_string()]);
        assert_eq!(f.coordinator.pending_requests(), 0);

        let second = f.coordinator.analytics_for("s1", entries, Some(vec![]), false).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_worker_for_other_requests() {
        let f = fixture(Some(vec![(60_000, "complete")]));
        let config = Arc::new(Config::default());

        let inner = Arc::clone(&f.coordinator.inner);
        let (input, cfg) = (AnalysisInput::from_entries("s1", sample_entries("s1", 6), vec![]), Arc::clone(&config));
        let a = tokio::spawn(async move { inner.compute("a".into(), input, cfg, false).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        let inner = Arc::clone(&f.coordinator.inner);
        let input = AnalysisInput::from_entries("s2", sample_entries("s2", 6), vec![]);
        let b = tokio::spawn(async move { inner.compute("b".into(), input, config, false).await });

        let a = a.await.unwrap().unwrap();
        assert!(a.error.is_none());
        assert!(!f.terminated.load(Ordering::SeqCst));
        assert_eq!(f.coordinator.pending_requests(), 1);

        let b = b.await.unwrap().unwrap();
        assert!(b.error.is_none());
        assert!(f.terminated.load(Ordering::SeqCst));
        assert_eq!(f.coordinator.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_survives_departed_callers() {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let mut receivers = Vec::new();
        for key in ["gone", "live"] {
            let (tx, rx) = oneshot::channel();
            pending.lock().insert(
                key.to_string(),
                PendingRequest {
                    id: 0,
                    leader: Some(tx),
                    followers: Vec::new(),
                    heartbeat: Arc::new(Notify::new()),
                },
            );
            receivers.push(rx);
        }
        drop(receivers.remove(0));

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(rx, Arc::clone(&pending)));
        for key in ["gone", "live"] {
            tx.send(WorkerMessage::Complete {
                cache_key: key.to_string(),
                payload: json!({"insights": ["from worker"]}),
            })
            .unwrap();
        }

        let live = receivers.remove(0).await.unwrap().unwrap();
        assert_eq!(live.insights, vec!["from worker".to_string()]);
        assert!(pending.lock().is_empty());
        drop(tx);
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_same_key_posts_once() {
        let f = fixture(Some(vec![(20, "complete")]));
        let input = AnalysisInput::from_entries("s1", sample_entries("s1", 4), vec![]);
        let config = Arc::new(Config::default());

        let (a, b) = tokio::join!(
            f.coordinator.inner.compute("k".into(), input.clone(), Arc::clone(&config), false),
            f.coordinator.inner.compute("k".into(), input, config, false),
        );

        assert_eq!(f.posts.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_stored_goals_reach_fingerprint() {
        let f = fixture(Some(vec![(1, "complete")]));
        let entries = sample_entries("s1", 5);

        f.coordinator.analytics_for("s1", entries.clone(), None, false).await;
        f.storage.set_goals(
            "s1",
            crate::tracking::demo::DemoDataGenerator::seeded("s1", 2).generate_goals(chrono::Utc::now(), 2),
        );
        f.coordinator.analytics_for("s1", entries, None, false).await;

        assert_eq!(f.posts.load(Ordering::SeqCst), 2);
        assert_eq!(f.coordinator.cache().len(), 2);
    }
}
