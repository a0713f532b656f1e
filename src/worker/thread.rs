// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Background analytics thread
//!
//! The thread owns nothing shared with the coordinator: requests arrive over
//! a crossbeam channel and replies leave over a tokio channel.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::protocol::{WorkerMessage, WorkerRequest};
use crate::analysis::{AnalysisRun, Phase};
use crate::error::{AnalyticsError, Result};

/// Handle to a running worker
pub trait WorkerHandle: Send + Sync {
    /// Queue a request; fails when the worker is gone
    fn post(&self, request: WorkerRequest) -> Result<()>;

    /// Stop the worker. Replies still in transit may arrive afterwards.
    fn terminate(&self);
}

/// Creates workers on demand
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, replies: mpsc::UnboundedSender<WorkerMessage>) -> Result<Box<dyn WorkerHandle>>;
}

enum Command {
    Analyze(WorkerRequest),
    Shutdown,
}

/// Runs analyses on a dedicated OS thread
#[derive(Debug, Clone, Default)]
pub struct ThreadWorkerSpawner;

impl WorkerSpawner for ThreadWorkerSpawner {
    fn spawn(&self, replies: mpsc::UnboundedSender<WorkerMessage>) -> Result<Box<dyn WorkerHandle>> {
        let (tx, rx) = unbounded();
        let join = thread::Builder::new()
            .name("analytics-worker".to_string())
            .spawn(move || worker_loop(rx, replies))
            .map_err(|e| AnalyticsError::Transport(format!("failed to spawn analytics worker: {}", e)))?;
        debug!("Analytics worker thread started");
        Ok(Box::new(ThreadWorker {
            tx,
            join: Mutex::new(Some(join)),
        }))
    }
}

struct ThreadWorker {
    tx: Sender<Command>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle for ThreadWorker {
    fn post(&self, request: WorkerRequest) -> Result<()> {
        self.tx
            .send(Command::Analyze(request))
            .map_err(|_| AnalyticsError::Transport("analytics worker channel closed".to_string()))
    }

    fn terminate(&self) {
        let _ = self.tx.send(Command::Shutdown);
        // Detach; the thread exits after its current request
        if self.join.lock().take().is_some() {
            debug!("Analytics worker terminated");
        }
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

fn worker_loop(rx: Receiver<Command>, replies: mpsc::UnboundedSender<WorkerMessage>) {
    while let Ok(command) = rx.recv() {
        let request = match command {
            Command::Analyze(request) => request,
            Command::Shutdown => break,
        };
        let reply = analyze(request, &replies);
        if replies.send(reply).is_err() {
            break;
        }
    }
    trace!("Analytics worker loop exited");
}

fn analyze(request: WorkerRequest, replies: &mpsc::UnboundedSender<WorkerMessage>) -> WorkerMessage {
    let WorkerRequest { cache_key, payload } = request;

    let mut run = AnalysisRun::new(&payload.inputs, &payload.config);
    if !payload.inputs.is_empty() {
        for phase in Phase::ALL {
            let _ = replies.send(WorkerMessage::Progress {
                cache_key: Some(cache_key.clone()),
                stage: Some(phase.label().to_string()),
            });
            run.execute(phase);
        }
    }
    let results = run.finish();

    match serde_json::to_value(&results) {
        Ok(payload) => WorkerMessage::Complete { cache_key, payload },
        Err(e) => {
            warn!("Could not encode analytics result for {}: {}", cache_key, e);
            WorkerMessage::Error {
                cache_key,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_entries;
    use crate::config::Config;
    use crate::tracking::AnalysisInput;
    use crate::worker::protocol::WorkerPayload;

    fn request(key: &str, inputs: AnalysisInput) -> WorkerRequest {
        WorkerRequest {
            cache_key: key.to_string(),
            payload: WorkerPayload {
                inputs,
                config: Config::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_worker_reports_progress_then_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = ThreadWorkerSpawner.spawn(tx).unwrap();
        let inputs = AnalysisInput::from_entries("s1", sample_entries("s1", 8), vec![]);
        worker.post(request("k1", inputs)).unwrap();

        let mut progress = 0;
        loop {
            match rx.recv().await.unwrap() {
                WorkerMessage::Progress { .. } => progress += 1,
                WorkerMessage::Complete { cache_key, payload } => {
                    assert_eq!(cache_key, "k1");
                    assert!(payload["patterns"].is_array());
                    break;
                }
                other => panic!("unexpected reply {:?}", other),
            }
        }
        assert_eq!(progress, Phase::ALL.len());
        worker.terminate();
    }

    #[tokio::test]
    async fn test_empty_input_completes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = ThreadWorkerSpawner.spawn(tx).unwrap();
        worker.post(request("empty", AnalysisInput::default())).unwrap();

        match rx.recv().await.unwrap() {
            WorkerMessage::Complete { cache_key, payload } => {
                assert_eq!(cache_key, "empty");
                assert_eq!(payload["anomalies"], serde_json::json!([]));
            }
            other => panic!("expected completion, got {:?}", other),
        }
        worker.terminate();
    }
}
