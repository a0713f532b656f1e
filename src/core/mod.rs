// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Core engine module - wires storage, cache, workers and invalidation

mod engine;
mod event_bus;
mod profile;
mod scheduler;

pub use engine::{AnalyticsOptions, Engine, EngineBuilder, EngineStats};
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use profile::{health_score, ProfileStore, RefreshFailure, RefreshSummary, StudentProfile, StudentStatus};
pub use scheduler::Scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub analyses_served: u64,
    pub data_changes: u64,
    pub uptime_seconds: u64,
    pub last_analysis: Option<DateTime<Utc>>,
}
