// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Analysis module - statistical analyzers and the facade that composes them

pub mod ai;
pub mod anomaly;
pub mod correlation;
pub mod patterns;
pub mod predictive;
pub mod results;
pub mod statistics;
pub mod trend;

pub use ai::AiAnalyzer;
pub use anomaly::{AnomalyDetection, AnomalyDetector, AnomalyType};
pub use correlation::{CorrelationAnalyzer, CorrelationMatrix, SignificantPair};
pub use patterns::{CorrelationResult, PatternDetector, PatternResult, PatternType};
pub use predictive::{PredictiveAnalyzer, PredictiveInsight};
pub use results::{normalize_results, AiAnalysis, AnalyticsResults, RawResults, TokenUsage};
pub use trend::{TimePoint, TrendAnalysis, TrendAnalyzer, TrendDirection};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AnalyticsError, Result};
use crate::tracking::AnalysisInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Low,
    Moderate,
    High,
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Significance::Low => "low",
            Significance::Moderate => "moderate",
            Significance::High => "high",
        };
        f.write_str(s)
    }
}

/// Sections of an analysis run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    EmotionPatterns,
    SensoryPatterns,
    Correlations,
    PredictiveInsights,
    Anomalies,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::EmotionPatterns,
        Phase::SensoryPatterns,
        Phase::Correlations,
        Phase::PredictiveInsights,
        Phase::Anomalies,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::EmotionPatterns => "Emotion pattern analysis",
            Phase::SensoryPatterns => "Sensory pattern analysis",
            Phase::Correlations => "Correlation analysis",
            Phase::PredictiveInsights => "Predictive analysis",
            Phase::Anomalies => "Anomaly detection",
        }
    }
}

/// One analysis in progress. Phases run one at a time so a caller can yield
/// between them; a failed phase leaves its section empty and is reported in
/// the summary insights.
pub struct AnalysisRun<'a> {
    input: &'a AnalysisInput,
    config: &'a Config,
    reference: DateTime<Utc>,
    results: AnalyticsResults,
    degraded: Vec<(Phase, AnalyticsError)>,
}

impl<'a> AnalysisRun<'a> {
    pub fn new(input: &'a AnalysisInput, config: &'a Config) -> Self {
        Self {
            input,
            config,
            reference: input.reference_time(),
            results: AnalyticsResults::default(),
            degraded: Vec::new(),
        }
    }

    pub fn execute(&mut self, phase: Phase) {
        if let Err(e) = self.compute(phase) {
            warn!("{} failed for student {}: {}", phase.label(), self.input.student_id, e);
            self.degraded.push((phase, e));
        }
    }

    fn compute(&mut self, phase: Phase) -> Result<()> {
        let input = self.input;
        let config = self.config;
        let sessions = input.session_count();
        let gates = &config.analytics;

        match phase {
            Phase::EmotionPatterns => {
                let patterns = PatternDetector::new(config, self.reference).emotion_patterns(&input.emotions)?;
                self.results.patterns.extend(patterns);
            }
            Phase::SensoryPatterns => {
                let patterns =
                    PatternDetector::new(config, self.reference).sensory_patterns(&input.sensory_inputs)?;
                self.results.patterns.extend(patterns);
            }
            Phase::Correlations => {
                if input.entries.len() < gates.min_tracking_for_correlation {
                    return Ok(());
                }
                self.results.environmental_correlations =
                    PatternDetector::new(config, self.reference).environmental_correlations(&input.entries)?;
                let analyzer = CorrelationAnalyzer::new(config);
                self.results.correlations = analyzer
                    .analyze(&input.entries)
                    .significant_pairs
                    .into_iter()
                    .map(pair_to_result)
                    .collect();
            }
            Phase::PredictiveInsights => {
                if sessions < gates.min_tracking_for_enhanced {
                    return Ok(());
                }
                self.results.predictive_insights = PredictiveAnalyzer::new(config, self.reference).insights(
                    &input.emotions,
                    &input.sensory_inputs,
                    &input.goals,
                )?;
            }
            Phase::Anomalies => {
                if sessions < gates.min_tracking_for_enhanced {
                    return Ok(());
                }
                self.results.anomalies =
                    AnomalyDetector::new(config).detect(&input.emotions, &input.sensory_inputs);
            }
        }
        Ok(())
    }

    /// Phases that failed so far
    pub fn degraded(&self) -> &[(Phase, AnalyticsError)] {
        &self.degraded
    }

    /// Add summary insights and interventions, then normalize
    pub fn finish(mut self) -> AnalyticsResults {
        self.results.insights = self.summary_insights();
        self.results.suggested_interventions = self.interventions();
        normalize_results(self.results)
    }

    fn summary_insights(&self) -> Vec<String> {
        let results = &self.results;
        let sessions = self.input.session_count();
        let mut insights = Vec::new();

        if sessions < self.config.insights.limited_data_sessions {
            insights.push(format!(
                "Limited data available ({} sessions). Continue tracking to unlock deeper insights.",
                sessions
            ));
        } else {
            insights.push(format!("Analytics processed successfully for {} sessions.", sessions));
        }

        if let Some(pattern) = results.patterns.first() {
            insights.push(format!("Most notable pattern: {}", pattern.description));
        }
        if let Some(c) = results.correlations.first() {
            insights.push(format!(
                "Strongest correlation: {} and {} (r = {:.2}, {})",
                c.factor1, c.factor2, c.correlation, c.significance
            ));
        }
        let high_risk = results
            .predictive_insights
            .iter()
            .filter(|i| i.severity == Some(Severity::High))
            .count();
        if high_risk > 0 {
            insights.push(format!("{} high-priority predictive insights need attention", high_risk));
        }
        if !results.anomalies.is_empty() {
            insights.push(format!("{} unusual events detected", results.anomalies.len()));
        }
        for (phase, error) in &self.degraded {
            insights.push(format!("{} unavailable: {}", phase.label(), error));
        }
        insights
    }

    fn interventions(&self) -> Vec<String> {
        let results = &self.results;
        let mut seen = HashSet::new();
        results
            .patterns
            .iter()
            .flat_map(|p| p.recommendations.iter())
            .chain(
                results
                    .predictive_insights
                    .iter()
                    .filter(|i| i.severity == Some(Severity::High))
                    .flat_map(|i| i.recommendations.iter()),
            )
            .chain(results.environmental_correlations.iter().flat_map(|c| c.recommendations.iter()))
            .filter(|r| seen.insert(r.as_str()))
            .take(self.config.insights.max_interventions)
            .cloned()
            .collect()
    }
}

fn pair_to_result(pair: SignificantPair) -> CorrelationResult {
    let direction = if pair.correlation >= 0.0 { "positive" } else { "negative" };
    CorrelationResult {
        description: format!(
            "{} and {} show a {} {} correlation",
            pair.factor1, pair.factor2, pair.significance, direction
        ),
        factor1: pair.factor1,
        factor2: pair.factor2,
        correlation: pair.correlation,
        significance: pair.significance,
        recommendations: Vec::new(),
        p_value: Some(pair.p_value),
    }
}

/// Composes the analyzers into one [`AnalyticsResults`]. Never fails.
#[derive(Default)]
pub struct PatternAnalysisFacade {
    ai: Option<Arc<dyn AiAnalyzer>>,
}

impl PatternAnalysisFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ai(ai: Arc<dyn AiAnalyzer>) -> Self {
        Self { ai: Some(ai) }
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    /// Statistical analysis of every section
    pub fn analyze(&self, input: &AnalysisInput, config: &Config) -> AnalyticsResults {
        let mut run = AnalysisRun::new(input, config);
        for phase in Phase::ALL {
            run.execute(phase);
        }
        debug!(
            "Analysis for {} finished with {} degraded sections",
            input.student_id,
            run.degraded().len()
        );
        run.finish()
    }

    /// Statistical analysis plus AI metadata. A failing AI call only omits `ai`.
    pub async fn analyze_with_ai(&self, input: &AnalysisInput, config: &Config) -> AnalyticsResults {
        let mut results = self.analyze(input, config);
        match self.consult_ai(input, &results).await {
            Ok(ai) => results.ai = Some(ai),
            Err(e) => warn!("AI analysis skipped for {}: {}", input.student_id, e),
        }
        normalize_results(results)
    }

    /// Like [`analyze_with_ai`](Self::analyze_with_ai) but surfaces the AI failure
    pub async fn analyze_with_ai_strict(&self, input: &AnalysisInput, config: &Config) -> Result<AnalyticsResults> {
        let mut results = self.analyze(input, config);
        results.ai = Some(self.consult_ai(input, &results).await?);
        Ok(normalize_results(results))
    }

    async fn consult_ai(&self, input: &AnalysisInput, local: &AnalyticsResults) -> Result<AiAnalysis> {
        let ai = self
            .ai
            .as_ref()
            .ok_or_else(|| AnalyticsError::Ai("no AI analyzer configured".to_string()))?;
        ai.analyze(input, local).await
    }
}
