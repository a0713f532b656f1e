// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Result schema and the single normalization boundary
//!
//! Every path that produces an [`AnalyticsResults`] (the background worker's
//! JSON payload, the fallback queue, the AI route) passes through
//! [`normalize_results`] before a caller or the cache sees it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::anomaly::AnomalyDetection;
use super::patterns::{CorrelationResult, PatternResult};
use super::predictive::PredictiveInsight;
use crate::error::AnalyticsError;

/// Token accounting reported by the AI collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Metadata attached when analysis was routed through the AI collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub caveats: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub data_lineage: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Output of one analysis run. Every collection is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsResults {
    pub patterns: Vec<PatternResult>,
    pub correlations: Vec<CorrelationResult>,
    pub environmental_correlations: Vec<CorrelationResult>,
    pub predictive_insights: Vec<PredictiveInsight>,
    pub anomalies: Vec<AnomalyDetection>,
    pub insights: Vec<String>,
    pub suggested_interventions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiAnalysis>,
}

impl AnalyticsResults {
    /// Minimal safe result describing a failure
    pub fn failed(error: &AnalyticsError) -> Self {
        Self {
            insights: vec!["Analytics are temporarily unavailable. Please try again.".to_string()],
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.correlations.is_empty()
            && self.environmental_correlations.is_empty()
            && self.predictive_insights.is_empty()
            && self.anomalies.is_empty()
    }
}

/// Anything that can be normalized into [`AnalyticsResults`]
#[derive(Debug, Clone)]
pub enum RawResults {
    Json(Value),
    Typed(AnalyticsResults),
}

impl From<Value> for RawResults {
    fn from(value: Value) -> Self {
        RawResults::Json(value)
    }
}

impl From<AnalyticsResults> for RawResults {
    fn from(results: AnalyticsResults) -> Self {
        RawResults::Typed(results)
    }
}

/// Coerce raw output into the strict schema.
///
/// JSON input is read field by field: missing or `null` collections become
/// empty and individual malformed items are dropped. Scores are then clamped
/// to finite ranges.
pub fn normalize_results(raw: impl Into<RawResults>) -> AnalyticsResults {
    let results = match raw.into() {
        RawResults::Typed(results) => results,
        RawResults::Json(Value::Object(map)) => from_object(map),
        RawResults::Json(other) => {
            debug!("Discarding non-object analytics payload: {}", other);
            AnalyticsResults::failed(&AnalyticsError::Serialization(
                "analytics payload is not an object".to_string(),
            ))
        }
    };
    sanitize(results)
}

fn from_object(mut map: Map<String, Value>) -> AnalyticsResults {
    let environmental = if map.contains_key("environmentalCorrelations") {
        items(&mut map, "environmentalCorrelations")
    } else {
        items(&mut map, "environmental_correlations")
    };
    let predictive = if map.contains_key("predictiveInsights") {
        items(&mut map, "predictiveInsights")
    } else {
        items(&mut map, "predictive_insights")
    };
    let interventions = if map.contains_key("suggestedInterventions") {
        items(&mut map, "suggestedInterventions")
    } else {
        items(&mut map, "suggested_interventions")
    };

    AnalyticsResults {
        patterns: items(&mut map, "patterns"),
        correlations: items(&mut map, "correlations"),
        environmental_correlations: environmental,
        predictive_insights: predictive,
        anomalies: items(&mut map, "anomalies"),
        insights: items(&mut map, "insights"),
        suggested_interventions: interventions,
        error: map.remove("error").and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }),
        ai: map
            .remove("ai")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v).ok()),
    }
}

fn items<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Vec<T> {
    match map.remove(key) {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(item) => Some(item),
                Err(e) => {
                    debug!("Dropping malformed '{}' item: {}", key, e);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn finite(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn sanitize(mut results: AnalyticsResults) -> AnalyticsResults {
    for p in &mut results.patterns {
        p.confidence = unit(p.confidence);
    }
    for c in results
        .correlations
        .iter_mut()
        .chain(results.environmental_correlations.iter_mut())
    {
        c.correlation = finite(c.correlation).clamp(-1.0, 1.0);
        c.p_value = c.p_value.map(unit);
    }
    for i in &mut results.predictive_insights {
        i.confidence = unit(i.confidence);
        if let Some(prediction) = i.prediction.as_mut() {
            prediction.value = finite(prediction.value);
            prediction.accuracy = unit(prediction.accuracy);
        }
    }
    for a in &mut results.anomalies {
        a.deviation_score = finite(a.deviation_score);
    }
    if let Some(ai) = results.ai.as_mut() {
        ai.confidence = ai.confidence.map(unit);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_collections_become_empty() {
        let results = normalize_results(json!({
            "patterns": null,
            "insights": ["ok"],
        }));
        assert!(results.patterns.is_empty());
        assert!(results.anomalies.is_empty());
        assert_eq!(results.insights, vec!["ok".to_string()]);
        assert!(results.error.is_none());
    }

    #[test]
    fn test_malformed_items_are_dropped_and_scores_clamped() {
        let results = normalize_results(json!({
            "patterns": [
                {"type": "emotion", "pattern": "consistent-emotion", "confidence": 1.7, "frequency": 4,
                 "description": "d", "dataPoints": 5, "timeframe": "30 days"},
                {"type": "unknown-kind"}
            ],
            "environmental_correlations": [
                {"factor1": "a", "factor2": "b", "correlation": 0.8, "significance": "high", "description": "d"}
            ]
        }));
        assert_eq!(results.patterns.len(), 1);
        assert_eq!(results.patterns[0].confidence, 1.0);
        assert_eq!(results.environmental_correlations.len(), 1);
    }

    #[test]
    fn test_non_object_payload_is_an_error_result() {
        let results = normalize_results(json!([1, 2, 3]));
        assert!(results.error.is_some());
        assert!(results.is_empty());
    }

    #[test]
    fn test_typed_roundtrip_through_json_is_stable() {
        let failed = AnalyticsResults::failed(&AnalyticsError::Timeout(5000));
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(normalize_results(value), normalize_results(failed));
    }
}
