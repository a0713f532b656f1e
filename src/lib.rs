// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Compass Analytics - analytics computation and caching for student tracking data
//!
//! Turns emotional, sensory and environmental tracking entries into patterns,
//! correlations, predictions and anomalies, and keeps the results cached and
//! consistent across every open context.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Engine (context)                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  request → Fingerprint → AnalyticsCache ─ hit ──→ result     │
//! │                               │ miss                         │
//! │                               ↓                              │
//! │                      WorkerCoordinator                       │
//! │                ┌──────────────┴──────────────┐               │
//! │         worker thread                 ComputeQueue           │
//! │     (progress / complete)        (fallback, AI route)        │
//! │                └──────────────┬──────────────┘               │
//! │                   PatternAnalysisFacade                      │
//! │       patterns · correlations · predictions · anomalies      │
//! │                                                              │
//! │  InvalidationBus: local events · broadcast hub · storage     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod invalidation;
pub mod tracking;
pub mod worker;

// Re-exports for convenience
pub use analysis::{AnalyticsResults, PatternAnalysisFacade};
pub use cache::{AnalyticsCache, Fingerprint};
pub use config::{Config, ConfigHandle};
pub use core::{AnalyticsOptions, Engine, EventBus};
pub use db::{DataStorage, Database, MemoryStorage};
pub use error::{AnalyticsError, Result};
pub use invalidation::{BroadcastHub, InvalidationBus, InvalidationSignal};
pub use tracking::{AnalysisInput, Goal, TrackingEntry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name
pub const NAME: &str = "Compass Analytics";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        schema_version: config::SCHEMA_VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Result schema version
    pub schema_version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "http-ai")]
    features.push("http-ai".to_string());

    features
}
