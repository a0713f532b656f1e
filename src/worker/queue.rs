// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! In-process fallback queue
//!
//! Used when the background thread is unavailable. Requests run strictly in
//! submission order, one at a time, yielding to the runtime between analysis
//! phases and pausing for a short cooldown between requests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::analysis::{normalize_results, AnalysisRun, AnalyticsResults, PatternAnalysisFacade, Phase};
use crate::config::Config;
use crate::error::{AnalyticsError, Result};
use crate::tracking::AnalysisInput;

/// Alternate analysis route tried first for AI-routed requests
#[async_trait]
pub trait AnalyticsDelegate: Send + Sync {
    async fn analyze(&self, input: &AnalysisInput, config: &Config) -> Result<AnalyticsResults>;
}

#[async_trait]
impl AnalyticsDelegate for PatternAnalysisFacade {
    async fn analyze(&self, input: &AnalysisInput, config: &Config) -> Result<AnalyticsResults> {
        if !config.features.ai_enabled {
            return Err(AnalyticsError::Ai("AI analysis is disabled".to_string()));
        }
        self.analyze_with_ai_strict(input, config).await
    }
}

struct Job {
    input: AnalysisInput,
    config: Arc<Config>,
    use_ai: bool,
    reply: oneshot::Sender<AnalyticsResults>,
}

#[derive(Default)]
struct QueueState {
    processing: AtomicBool,
    pending: AtomicUsize,
}

pub struct ComputeQueue {
    tx: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ComputeQueue {
    /// Start the processing task on the current runtime
    pub fn start(delegate: Option<Arc<dyn AnalyticsDelegate>>, cooldown: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let state = Arc::new(QueueState::default());

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                task_state.pending.fetch_sub(1, Ordering::SeqCst);
                task_state.processing.store(true, Ordering::SeqCst);

                let results = process(delegate.as_deref(), &job).await;
                if job.reply.send(results).is_err() {
                    debug!("Queued analytics caller went away before completion");
                }

                task_state.processing.store(false, Ordering::SeqCst);
                tokio::time::sleep(cooldown).await;
            }
        });

        Self {
            tx,
            state,
            task: Mutex::new(Some(task)),
        }
    }

    /// Enqueue an analysis and wait for its turn
    pub async fn submit(&self, input: AnalysisInput, config: Arc<Config>, use_ai: bool) -> Result<AnalyticsResults> {
        let (reply, rx) = oneshot::channel();
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            input,
            config,
            use_ai,
            reply,
        };
        if self.tx.send(job).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(AnalyticsError::Shutdown("compute queue"));
        }
        rx.await.map_err(|_| AnalyticsError::Shutdown("compute queue"))
    }

    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }

    /// Requests waiting behind the current one
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for ComputeQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn process(delegate: Option<&dyn AnalyticsDelegate>, job: &Job) -> AnalyticsResults {
    if job.use_ai {
        if let Some(delegate) = delegate {
            match delegate.analyze(&job.input, &job.config).await {
                Ok(results) => return normalize_results(results),
                Err(e) => warn!("AI-routed analysis failed, computing locally: {}", e),
            }
        }
    }

    let mut run = AnalysisRun::new(&job.input, &job.config);
    for phase in Phase::ALL {
        run.execute(phase);
        tokio::task::yield_now().await;
    }
    run.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{sample_entries, EchoAi};

    struct Recorder {
        order: Mutex<Vec<String>>,
        busy: AtomicBool,
    }

    #[async_trait]
    impl AnalyticsDelegate for Recorder {
        async fn analyze(&self, input: &AnalysisInput, _: &Config) -> Result<AnalyticsResults> {
            assert!(!self.busy.swap(true, Ordering::SeqCst), "requests overlapped");
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.order.lock().push(input.student_id.clone());
            self.busy.store(false, Ordering::SeqCst);
            Ok(AnalyticsResults::default())
        }
    }

    fn input(student: &str) -> AnalysisInput {
        AnalysisInput::from_entries(student, sample_entries(student, 6), vec![])
    }

    #[tokio::test]
    async fn test_requests_run_in_submission_order() {
        let recorder = Arc::new(Recorder {
            order: Mutex::new(Vec::new()),
            busy: AtomicBool::new(false),
        });
        let delegate: Arc<dyn AnalyticsDelegate> = recorder.clone();
        let queue = ComputeQueue::start(Some(delegate), Duration::from_millis(1));
        let config = Arc::new(Config::default());

        let results = futures::future::join_all(
            ["a", "b", "c"]
                .iter()
                .map(|s| queue.submit(input(s), Arc::clone(&config), true)),
        )
        .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(*recorder.order.lock(), vec!["a", "b", "c"]);
        assert!(!queue.is_processing());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_local_path_matches_facade() {
        let queue = ComputeQueue::start(None, Duration::from_millis(1));
        let config = Config::default();
        let input = input("s1");

        let queued = queue.submit(input.clone(), Arc::new(config.clone()), false).await.unwrap();
        assert_eq!(queued, PatternAnalysisFacade::new().analyze(&input, &config));
    }

    #[tokio::test]
    async fn test_ai_route_falls_back_when_disabled() {
        let facade: Arc<dyn AnalyticsDelegate> = Arc::new(PatternAnalysisFacade::with_ai(Arc::new(EchoAi)));
        let queue = ComputeQueue::start(Some(facade), Duration::from_millis(1));
        let input = input("s1");

        let disabled = queue.submit(input.clone(), Arc::new(Config::default()), true).await.unwrap();
        assert!(disabled.ai.is_none());

        let mut enabled = Config::default();
        enabled.features.ai_enabled = true;
        let routed = queue.submit(input, Arc::new(enabled), true).await.unwrap();
        assert_eq!(routed.ai.map(|a| a.provider), Some("echo".to_string()));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let queue = ComputeQueue::start(None, Duration::from_millis(1));
        queue.shutdown();
        tokio::task::yield_now().await;
        let result = queue.submit(input("s1"), Arc::new(Config::default()), false).await;
        assert!(matches!(result, Err(AnalyticsError::Shutdown(_))));
    }
}
