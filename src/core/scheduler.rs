// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Task scheduler for timed operations

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

type TaskFn = Box<dyn Fn() + Send + Sync + 'static>;

struct ScheduledTask {
    interval: Duration,
    enabled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs named tasks at fixed intervals on the tokio runtime
pub struct Scheduler {
    tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run `task` every `interval`, first after one interval. Replaces a task with the same name.
    pub async fn add_task<F>(&self, name: &str, interval: Duration, task: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let enabled = Arc::new(AtomicBool::new(true));
        let task: TaskFn = Box::new(task);

        let flag = Arc::clone(&enabled);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Relaxed) {
                    task();
                }
            }
        });

        let mut tasks = self.tasks.write().await;
        if let Some(previous) = tasks.insert(
            name.to_string(),
            ScheduledTask {
                interval,
                enabled,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!("Scheduled task '{}' with interval {:?}", name, interval);
    }

    pub async fn remove_task(&self, name: &str) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.remove(name) {
            task.handle.abort();
        }
    }

    pub async fn enable_task(&self, name: &str, enabled: bool) {
        let tasks = self.tasks.read().await;
        if let Some(task) = tasks.get(name) {
            task.enabled.store(enabled, Ordering::Relaxed);
        }
    }

    /// Scheduled task names with their intervals
    pub async fn tasks(&self) -> Vec<(String, Duration)> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<_> = tasks.iter().map(|(name, t)| (name.clone(), t.interval)).collect();
        list.sort();
        list
    }

    /// Stop every task
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.write().await;
        for (name, task) in tasks.drain() {
            task.handle.abort();
            debug!("Stopped task '{}'", name);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
