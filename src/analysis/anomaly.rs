// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Anomaly detection over emotion intensity and daily sensory activity

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::statistics::robust_z_scores;
use super::Severity;
use crate::config::{AlertSensitivity, Config};
use crate::tracking::{EmotionEntry, SensoryEntry};

/// Stream an anomaly was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    Emotion,
    Sensory,
    Environmental,
}

/// Detected anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyDetection {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    /// Absolute robust z-score
    pub deviation_score: f64,
    pub recommendations: Vec<String>,
}

/// Median/MAD anomaly detector
pub struct AnomalyDetector<'a> {
    config: &'a Config,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Score above which a point is flagged
    pub fn threshold(&self) -> f64 {
        self.config.enhanced_analysis.anomaly_threshold
            * AlertSensitivity::safe(self.config.alert_sensitivity.anomaly_multiplier)
    }

    pub fn severity_for(&self, score: f64) -> Severity {
        let levels = &self.config.enhanced_analysis.anomaly_severity_levels;
        if score >= levels.high {
            Severity::High
        } else if score >= levels.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// All anomalies, newest first
    pub fn detect(&self, emotions: &[EmotionEntry], sensory: &[SensoryEntry]) -> Vec<AnomalyDetection> {
        let mut anomalies = self.detect_emotion_intensity(emotions);
        anomalies.extend(self.detect_sensory_frequency(sensory));
        anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        anomalies
    }

    pub fn detect_emotion_intensity(&self, emotions: &[EmotionEntry]) -> Vec<AnomalyDetection> {
        let intensities: Vec<f64> = emotions.iter().map(|e| e.intensity_value()).collect();
        let scores = robust_z_scores(&intensities);
        let threshold = self.threshold();

        emotions
            .iter()
            .zip(scores)
            .filter_map(|(emotion, z)| {
                let score = z.abs();
                if score <= threshold {
                    return None;
                }
                Some(AnomalyDetection {
                    timestamp: emotion.timestamp,
                    anomaly_type: AnomalyType::Emotion,
                    severity: self.severity_for(score),
                    description: format!(
                        "Unusual {} intensity detected ({}/5)",
                        emotion.emotion, emotion.intensity
                    ),
                    deviation_score: score,
                    recommendations: recommendations(AnomalyType::Emotion),
                })
            })
            .collect()
    }

    pub fn detect_sensory_frequency(&self, sensory: &[SensoryEntry]) -> Vec<AnomalyDetection> {
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for input in sensory {
            *per_day.entry(input.timestamp.date_naive()).or_insert(0) += 1;
        }
        if per_day.is_empty() {
            return Vec::new();
        }

        let counts: Vec<f64> = per_day.values().map(|c| *c as f64).collect();
        let scores = robust_z_scores(&counts);
        let threshold = self.threshold();

        per_day
            .iter()
            .zip(scores)
            .filter_map(|((day, count), z)| {
                let score = z.abs();
                if score <= threshold {
                    return None;
                }
                let midnight = day.and_hms_opt(0, 0, 0)?;
                Some(AnomalyDetection {
                    timestamp: Utc.from_utc_datetime(&midnight),
                    anomaly_type: AnomalyType::Sensory,
                    severity: self.severity_for(score),
                    description: format!("Unusual sensory activity level detected ({} inputs)", count),
                    deviation_score: score,
                    recommendations: recommendations(AnomalyType::Sensory),
                })
            })
            .collect()
    }
}

fn recommendations(kind: AnomalyType) -> Vec<String> {
    let items: &[&str] = match kind {
        AnomalyType::Emotion => &[
            "Investigate potential triggers for this emotional spike",
            "Provide immediate support and coping strategies",
            "Monitor closely for additional unusual patterns",
        ],
        AnomalyType::Sensory => &[
            "Review sensory environment for unusual factors",
            "Check for changes in routine or schedule",
            "Provide additional sensory regulation support",
        ],
        AnomalyType::Environmental => &["Investigate potential causes", "Monitor closely"],
    };
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn emotions(intensities: &[u8]) -> Vec<EmotionEntry> {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        intensities
            .iter()
            .enumerate()
            .map(|(i, &intensity)| EmotionEntry {
                id: None,
                emotion: "anxious".into(),
                intensity,
                timestamp: start + Duration::hours(i as i64 * 6),
                triggers: vec![],
            })
            .collect()
    }

    #[test]
    fn test_outlier_flagged_at_least_medium() {
        let config = Config::default();
        let data = emotions(&[2, 2, 2, 2, 2, 2, 2, 1, 3, 2, 2, 2, 5]);
        let anomalies = AnomalyDetector::new(&config).detect(&data, &[]);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].timestamp, data[12].timestamp);
        assert!(anomalies[0].severity >= Severity::Medium);
        assert!(anomalies[0].deviation_score > config.enhanced_analysis.anomaly_threshold);
    }

    #[test]
    fn test_zero_variance_flags_nothing() {
        let config = Config::default();
        let data = emotions(&[3; 20]);
        assert!(AnomalyDetector::new(&config).detect(&data, &[]).is_empty());
        assert!(AnomalyDetector::new(&config).detect(&[], &[]).is_empty());
    }

    #[test]
    fn test_sensory_burst_day_and_newest_first() {
        let config = Config::default();
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut sensory = Vec::new();
        for day in 0..10 {
            let per_day = if day == 4 { 12 } else { 2 };
            for i in 0..per_day {
                sensory.push(SensoryEntry {
                    id: None,
                    sensory_type: "auditory".into(),
                    response: "seeking".into(),
                    intensity: None,
                    timestamp: start + Duration::days(day) + Duration::minutes(i),
                });
            }
        }
        let data = emotions(&[2, 2, 2, 2, 2, 2, 2, 1, 3, 2, 2, 2, 5]);

        let anomalies = AnomalyDetector::new(&config).detect(&data, &sensory);
        let sensory_hits: Vec<_> = anomalies.iter().filter(|a| a.anomaly_type == AnomalyType::Sensory).collect();
        assert_eq!(sensory_hits.len(), 1);
        assert_eq!(sensory_hits[0].timestamp.date_naive(), (start + Duration::days(4)).date_naive());
        assert!(anomalies.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }
}
