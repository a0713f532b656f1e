// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module
//!
//! [`Config`] is persisted as TOML. At runtime components read it through a
//! [`ConfigSource`]; if the source fails they fall back to built-in defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::AnalyticsError;

/// Version of the analytics result schema
pub const SCHEMA_VERSION: &str = "2.3.0";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Result schema version; part of every cache fingerprint
    pub schema_version: String,

    /// Result cache
    pub cache: CacheConfig,

    /// Thresholds for emotion, sensory and environmental pattern detection
    pub pattern_analysis: PatternAnalysisConfig,

    /// Trend, anomaly and correlation parameters
    pub enhanced_analysis: EnhancedAnalysisConfig,

    /// Analysis windows in days
    pub time_windows: TimeWindows,

    /// Sensitivity multipliers applied to alert thresholds
    pub alert_sensitivity: AlertSensitivity,

    /// Emotion taxonomy
    pub taxonomy: Taxonomy,

    /// Minimum data gates per section
    pub analytics: AnalyticsGates,

    /// Summary insight generation
    pub insights: InsightsConfig,

    /// Points awarded per result section in a student's health score
    pub health_score: HealthScoreWeights,

    /// Feature flags
    pub features: FeatureFlags,

    /// Background worker and fallback queue
    pub worker: WorkerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// AI collaborator
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Compass Analytics".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            cache: CacheConfig::default(),
            pattern_analysis: PatternAnalysisConfig::default(),
            enhanced_analysis: EnhancedAnalysisConfig::default(),
            time_windows: TimeWindows::default(),
            alert_sensitivity: AlertSensitivity::default(),
            taxonomy: Taxonomy::default(),
            analytics: AnalyticsGates::default(),
            insights: InsightsConfig::default(),
            health_score: HealthScoreWeights::default(),
            features: FeatureFlags::default(),
            worker: WorkerConfig::default(),
            database: DatabaseConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("compass-analytics"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Result cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time-to-live of a cached result in milliseconds
    pub ttl_ms: u64,

    /// Maximum number of cached results; the oldest is evicted first
    pub max_size: usize,

    /// Drop every cached result when the configuration changes
    pub invalidate_on_config_change: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 600_000,
            max_size: 50,
            invalidate_on_config_change: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternAnalysisConfig {
    pub min_data_points: usize,
    pub correlation_threshold: f64,
    pub high_intensity_threshold: f64,
    pub concern_frequency_threshold: f64,
    pub emotion_consistency_threshold: f64,
    pub moderate_negative_threshold: f64,
}

impl Default for PatternAnalysisConfig {
    fn default() -> Self {
        Self {
            min_data_points: 3,
            correlation_threshold: 0.25,
            high_intensity_threshold: 4.0,
            concern_frequency_threshold: 0.3,
            emotion_consistency_threshold: 0.4,
            moderate_negative_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedAnalysisConfig {
    /// Minimum samples for trend fitting and correlation pairs
    pub min_sample_size: usize,
    /// Absolute daily rate under which a trend is stable
    pub trend_threshold: f64,
    /// Minimum R² before a forecast is reported
    pub prediction_confidence_threshold: f64,
    /// Robust z-score above which a point is anomalous
    pub anomaly_threshold: f64,
    pub anomaly_severity_levels: SeverityLevels,
    pub huber: HuberConfig,
    pub quality_targets: QualityTargets,
    pub correlation_significance: SignificanceBands,
    pub risk_assessment: RiskAssessmentConfig,
}

impl Default for EnhancedAnalysisConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 5,
            trend_threshold: 0.02,
            prediction_confidence_threshold: 0.6,
            anomaly_threshold: 2.5,
            anomaly_severity_levels: SeverityLevels::default(),
            huber: HuberConfig::default(),
            quality_targets: QualityTargets::default(),
            correlation_significance: SignificanceBands::default(),
            risk_assessment: RiskAssessmentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityLevels {
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityLevels {
    fn default() -> Self {
        Self { medium: 2.5, high: 3.0 }
    }
}

/// Huber IRLS parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuberConfig {
    pub delta: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for HuberConfig {
    fn default() -> Self {
        Self {
            delta: 1.345,
            max_iter: 50,
            tol: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityTargets {
    pub points_target: usize,
    pub time_span_days_target: f64,
}

impl Default for QualityTargets {
    fn default() -> Self {
        Self {
            points_target: 30,
            time_span_days_target: 21.0,
        }
    }
}

/// Absolute correlation cut-offs for the low/moderate/high bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificanceBands {
    pub high: f64,
    pub moderate: f64,
    pub low: f64,
}

impl Default for SignificanceBands {
    fn default() -> Self {
        Self {
            high: 0.7,
            moderate: 0.5,
            low: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAssessmentConfig {
    pub stress_intensity_threshold: f64,
    pub stress_emotions: Vec<String>,
    /// High-stress incidents within the short-term window that raise a risk
    pub incidents_threshold: usize,
}

impl Default for RiskAssessmentConfig {
    fn default() -> Self {
        Self {
            stress_intensity_threshold: 4.0,
            stress_emotions: ["anxious", "frustrated", "overwhelmed", "angry"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            incidents_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindows {
    pub default_analysis_days: i64,
    pub recent_data_days: i64,
    pub short_term_days: i64,
    pub long_term_days: i64,
}

impl Default for TimeWindows {
    fn default() -> Self {
        Self {
            default_analysis_days: 30,
            recent_data_days: 7,
            short_term_days: 14,
            long_term_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSensitivity {
    pub level: SensitivityLevel,
    pub emotion_intensity_multiplier: f64,
    pub frequency_multiplier: f64,
    pub anomaly_multiplier: f64,
}

impl Default for AlertSensitivity {
    fn default() -> Self {
        Self {
            level: SensitivityLevel::Medium,
            emotion_intensity_multiplier: 1.0,
            frequency_multiplier: 1.0,
            anomaly_multiplier: 1.0,
        }
    }
}

impl AlertSensitivity {
    /// Multipliers are divisors of thresholds; a zero or negative value is treated as neutral
    pub fn safe(value: f64) -> f64 {
        if value.is_finite() && value > 0.0 {
            value
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub positive_emotions: Vec<String>,
    pub negative_emotions: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            positive_emotions: list(&[
                "happy", "calm", "excited", "content", "peaceful", "cheerful", "relaxed", "optimistic",
            ]),
            negative_emotions: list(&["anxious", "frustrated", "angry", "overwhelmed", "sad"]),
        }
    }
}

impl Taxonomy {
    pub fn is_positive(&self, label: &str) -> bool {
        self.positive_emotions.iter().any(|e| e.eq_ignore_ascii_case(label))
    }

    pub fn is_negative(&self, label: &str) -> bool {
        self.negative_emotions.iter().any(|e| e.eq_ignore_ascii_case(label))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsGates {
    pub min_tracking_for_correlation: usize,
    pub min_tracking_for_enhanced: usize,
}

impl Default for AnalyticsGates {
    fn default() -> Self {
        Self {
            min_tracking_for_correlation: 3,
            min_tracking_for_enhanced: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    /// Below this many sessions the summary carries a limited-data notice
    pub limited_data_sessions: usize,
    pub max_interventions: usize,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            limited_data_sessions: 5,
            max_interventions: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthScoreWeights {
    pub patterns: u32,
    pub correlations: u32,
    pub predictions: u32,
    pub anomalies: u32,
    pub minimum_data: u32,
}

impl Default for HealthScoreWeights {
    fn default() -> Self {
        Self {
            patterns: 20,
            correlations: 20,
            predictions: 20,
            anomalies: 20,
            minimum_data: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Route analysis through the AI collaborator when the caller does not choose
    pub ai_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Watchdog for a worker reply; clamped to 5-20 seconds
    pub timeout_ms: u64,
    /// Pause after each fallback queue request
    pub queue_cooldown_ms: u64,
    /// Interval between storage signal polls
    pub signal_poll_ms: u64,
    /// Interval between expired cache entry sweeps
    pub sweep_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            queue_cooldown_ms: 100,
            signal_poll_ms: 1_000,
            sweep_interval_ms: 60_000,
        }
    }
}

impl WorkerConfig {
    pub const MIN_TIMEOUT_MS: u64 = 5_000;
    pub const MAX_TIMEOUT_MS: u64 = 20_000;

    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.clamp(Self::MIN_TIMEOUT_MS, Self::MAX_TIMEOUT_MS)
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/compass.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// JSON endpoint of the AI analysis service
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "compass-insights".to_string(),
            api_key_env: "COMPASS_AI_API_KEY".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Runtime access to configuration
pub trait ConfigSource: Send + Sync {
    /// Current configuration snapshot
    fn current(&self) -> std::result::Result<Arc<Config>, AnalyticsError>;

    /// Change notifications, when the source supports them
    fn subscribe(&self) -> Option<watch::Receiver<Arc<Config>>> {
        None
    }
}

/// Live configuration that publishes updates to subscribers
pub struct ConfigHandle {
    tx: watch::Sender<Arc<Config>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        let (tx, _) = watch::channel(Arc::new(config));
        Self { tx }
    }

    /// Replace the configuration and notify subscribers
    pub fn update(&self, config: Config) {
        info!("Configuration updated");
        self.tx.send_replace(Arc::new(config));
    }

    /// Apply an in-place change to the current configuration
    pub fn modify<F: FnOnce(&mut Config)>(&self, change: F) {
        let mut config = (**self.tx.borrow()).clone();
        change(&mut config);
        self.update(config);
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ConfigSource for ConfigHandle {
    fn current(&self) -> std::result::Result<Arc<Config>, AnalyticsError> {
        Ok(Arc::clone(&self.tx.borrow()))
    }

    fn subscribe(&self) -> Option<watch::Receiver<Arc<Config>>> {
        Some(self.tx.subscribe())
    }
}

/// Reads a [`ConfigSource`], substituting defaults when it fails.
/// The first failure is logged; later ones are silent.
pub struct ConfigReader {
    source: Arc<dyn ConfigSource>,
    warned: AtomicBool,
}

impl ConfigReader {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            warned: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Arc<Config> {
        match self.source.current() {
            Ok(config) => config,
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!("Using built-in analytics defaults: {}", e);
                }
                Arc::new(Config::default())
            }
        }
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<Arc<Config>>> {
        self.source.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSource;

    impl ConfigSource for BrokenSource {
        fn current(&self) -> std::result::Result<Arc<Config>, AnalyticsError> {
            Err(AnalyticsError::Config("unreadable".into()))
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            ttl_ms = 1000

            [enhanced_analysis]
            trend_threshold = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.ttl_ms, 1000);
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.enhanced_analysis.trend_threshold, 0.5);
        assert_eq!(config.enhanced_analysis.min_sample_size, 5);
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!("compass-config-{}.toml", uuid::Uuid::new_v4()));
        let created = Config::load_or_create(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(created, loaded);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reader_falls_back_to_defaults() {
        let reader = ConfigReader::new(Arc::new(BrokenSource));
        assert_eq!(*reader.get(), Config::default());
        assert_eq!(*reader.get(), Config::default());
        assert!(reader.subscribe().is_none());
    }

    #[test]
    fn test_handle_publishes_updates() {
        let handle = ConfigHandle::default();
        let mut rx = handle.subscribe().unwrap();
        handle.modify(|c| c.time_windows.default_analysis_days = 60);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().time_windows.default_analysis_days, 60);
        assert_eq!(handle.current().unwrap().time_windows.default_analysis_days, 60);
    }

    #[test]
    fn test_worker_timeout_is_clamped() {
        let mut worker = WorkerConfig::default();
        worker.timeout_ms = 10;
        assert_eq!(worker.effective_timeout_ms(), 5_000);
        worker.timeout_ms = 60_000;
        assert_eq!(worker.effective_timeout_ms(), 20_000);
    }
}
