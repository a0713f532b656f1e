// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Pattern detection - emotion, sensory and environmental patterns

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::correlation::CorrelationAnalyzer;
use super::statistics::{mean, pearson};
use super::Significance;
use crate::config::{AlertSensitivity, Config};
use crate::error::{AnalyticsError, Result};
use crate::tracking::{EmotionEntry, ResponseKind, SensoryEntry, TrackingEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Emotion,
    Sensory,
    Environmental,
    Correlation,
}

/// Detected behavioral pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternResult {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub pattern: String,
    /// 0-1
    pub confidence: f64,
    pub frequency: usize,
    pub description: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub data_points: usize,
    pub timeframe: String,
}

/// Relationship between two factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResult {
    pub factor1: String,
    pub factor2: String,
    pub correlation: f64,
    pub significance: Significance,
    pub description: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Rejects intensities outside the 1-5 scale
pub fn validate_emotions(emotions: &[EmotionEntry]) -> Result<()> {
    match emotions.iter().find(|e| !(1..=5).contains(&e.intensity)) {
        Some(bad) => Err(AnalyticsError::InvalidInput(format!(
            "{} intensity {} is outside the 1-5 scale",
            bad.emotion, bad.intensity
        ))),
        None => Ok(()),
    }
}

/// Rule-based pattern detector
pub struct PatternDetector<'a> {
    config: &'a Config,
    reference: DateTime<Utc>,
}

impl<'a> PatternDetector<'a> {
    /// `reference` anchors the analysis window
    pub fn new(config: &'a Config, reference: DateTime<Utc>) -> Self {
        Self { config, reference }
    }

    fn window_days(&self) -> i64 {
        self.config.time_windows.default_analysis_days.max(1)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.reference - Duration::days(self.window_days())
    }

    fn timeframe(&self) -> String {
        format!("{} days", self.window_days())
    }

    pub fn emotion_patterns(&self, emotions: &[EmotionEntry]) -> Result<Vec<PatternResult>> {
        validate_emotions(emotions)?;
        let pa = &self.config.pattern_analysis;
        if emotions.len() < pa.min_data_points {
            return Ok(Vec::new());
        }

        let cutoff = self.cutoff();
        let recent: Vec<&EmotionEntry> = emotions.iter().filter(|e| e.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return Ok(Vec::new());
        }
        let total = recent.len() as f64;
        let sensitivity = &self.config.alert_sensitivity;
        let taxonomy = &self.config.taxonomy;

        let intensity_threshold =
            pa.high_intensity_threshold / AlertSensitivity::safe(sensitivity.emotion_intensity_multiplier);
        let frequency_threshold =
            pa.concern_frequency_threshold / AlertSensitivity::safe(sensitivity.frequency_multiplier);
        let moderate_threshold = (pa.high_intensity_threshold - 1.0).max(1.0);

        let high_negative = recent
            .iter()
            .filter(|e| e.intensity_value() >= intensity_threshold && taxonomy.is_negative(&e.emotion))
            .count();
        let moderate_negative = recent
            .iter()
            .filter(|e| e.intensity_value() >= moderate_threshold && taxonomy.is_negative(&e.emotion))
            .count();

        let mut patterns = Vec::new();

        let high_ratio = high_negative as f64 / total;
        if high_ratio > frequency_threshold {
            patterns.push(PatternResult {
                pattern_type: PatternType::Emotion,
                pattern: "high-intensity-negative".to_string(),
                confidence: high_ratio.min(1.0),
                frequency: high_negative,
                description: format!(
                    "High-intensity negative emotions detected in {}% of recent sessions",
                    (high_ratio * 100.0).round()
                ),
                recommendations: strings(&[
                    "Consider implementing calming strategies before intense activities",
                    "Monitor environmental triggers that may contribute to stress",
                    "Discuss coping mechanisms with student",
                ]),
                data_points: recent.len(),
                timeframe: self.timeframe(),
            });
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for e in &recent {
            *counts.entry(e.label()).or_insert(0) += 1;
        }
        let mut dominant: Option<(&String, usize)> = None;
        for (label, &count) in &counts {
            if dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((label, count));
            }
        }
        if let Some((label, count)) = dominant {
            let ratio = count as f64 / total;
            if ratio > pa.emotion_consistency_threshold {
                patterns.push(PatternResult {
                    pattern_type: PatternType::Emotion,
                    pattern: "consistent-emotion".to_string(),
                    confidence: ratio,
                    frequency: count,
                    description: format!("Consistent {} emotion pattern detected", label),
                    recommendations: emotion_recommendations(label, self.config),
                    data_points: recent.len(),
                    timeframe: self.timeframe(),
                });
            }
        }

        let moderate_ratio = moderate_negative as f64 / total;
        if high_negative == 0 && moderate_ratio > pa.moderate_negative_threshold {
            patterns.push(PatternResult {
                pattern_type: PatternType::Emotion,
                pattern: "moderate-negative-trend".to_string(),
                confidence: moderate_ratio,
                frequency: moderate_negative,
                description: format!(
                    "Moderate negative emotions detected in {}% of recent sessions",
                    (moderate_ratio * 100.0).round()
                ),
                recommendations: strings(&[
                    "Monitor for potential stress escalation",
                    "Implement preventive calming strategies",
                    "Consider environmental adjustments",
                ]),
                data_points: recent.len(),
                timeframe: self.timeframe(),
            });
        }

        Ok(patterns)
    }

    pub fn sensory_patterns(&self, sensory: &[SensoryEntry]) -> Result<Vec<PatternResult>> {
        let pa = &self.config.pattern_analysis;
        if sensory.len() < pa.min_data_points {
            return Ok(Vec::new());
        }

        let cutoff = self.cutoff();
        let recent: Vec<&SensoryEntry> = sensory.iter().filter(|s| s.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return Ok(Vec::new());
        }

        let seeking = recent.iter().filter(|s| s.response_kind() == ResponseKind::Seeking).count();
        let avoiding = recent.iter().filter(|s| s.response_kind() == ResponseKind::Avoiding).count();
        let total = recent.len() as f64;

        let dominance = 1.0 + pa.concern_frequency_threshold;
        let prevalence = pa.concern_frequency_threshold;
        let seeking_share = seeking as f64 / total;
        let avoiding_share = avoiding as f64 / total;

        let seeking_pattern = |confidence: f64, description: &str| PatternResult {
            pattern_type: PatternType::Sensory,
            pattern: "sensory-seeking".to_string(),
            confidence,
            frequency: seeking,
            description: description.to_string(),
            recommendations: strings(&[
                "Provide scheduled sensory breaks",
                "Offer fidget tools and movement opportunities",
                "Consider sensory-rich learning activities",
            ]),
            data_points: recent.len(),
            timeframe: self.timeframe(),
        };
        let avoiding_pattern = |confidence: f64, description: &str| PatternResult {
            pattern_type: PatternType::Sensory,
            pattern: "sensory-avoiding".to_string(),
            confidence,
            frequency: avoiding,
            description: description.to_string(),
            recommendations: strings(&[
                "Provide quiet, low-stimulation spaces",
                "Use noise-canceling headphones when appropriate",
                "Gradually introduce sensory experiences",
            ]),
            data_points: recent.len(),
            timeframe: self.timeframe(),
        };

        let pattern = if avoiding > 0 && seeking as f64 / avoiding as f64 > dominance {
            Some(seeking_pattern(seeking_share, "Strong sensory-seeking pattern identified"))
        } else if seeking > 0 && avoiding as f64 / seeking as f64 > dominance {
            Some(avoiding_pattern(avoiding_share, "Strong sensory-avoiding pattern identified"))
        } else if avoiding == 0 && seeking > 0 && seeking_share >= prevalence {
            Some(seeking_pattern(seeking_share, "Prevalent sensory-seeking behavior observed"))
        } else if seeking == 0 && avoiding > 0 && avoiding_share >= prevalence {
            Some(avoiding_pattern(avoiding_share, "Prevalent sensory-avoiding behavior observed"))
        } else {
            None
        };

        Ok(pattern.into_iter().collect())
    }

    pub fn environmental_correlations(&self, entries: &[TrackingEntry]) -> Result<Vec<CorrelationResult>> {
        let pa = &self.config.pattern_analysis;
        if entries.len() < pa.min_data_points {
            return Ok(Vec::new());
        }
        let mut correlations = Vec::new();
        let bands = CorrelationAnalyzer::new(self.config);

        let (noise, intensity): (Vec<f64>, Vec<f64>) = entries
            .iter()
            .filter_map(|e| Some((e.room()?.noise_level?, e.average_intensity()?)))
            .unzip();
        if noise.len() >= pa.min_data_points {
            let r = pearson(&noise, &intensity);
            if r.abs() > pa.correlation_threshold {
                let (description, recommendations) = if r > 0.0 {
                    (
                        "Higher noise levels correlate with more intense emotions",
                        strings(&["Consider noise reduction strategies", "Provide quiet spaces during intense activities"]),
                    )
                } else {
                    (
                        "Lower noise levels correlate with more intense emotions",
                        strings(&["Monitor for overstimulation in quiet environments"]),
                    )
                };
                correlations.push(CorrelationResult {
                    factor1: "Noise Level".to_string(),
                    factor2: "Emotion Intensity".to_string(),
                    correlation: r,
                    significance: bands.significance(r),
                    description: description.to_string(),
                    recommendations,
                    p_value: None,
                });
            }
        }

        let mut lighting_groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for entry in entries {
            let Some(lighting) = entry.room().and_then(|r| r.lighting.as_ref()) else {
                continue;
            };
            if entry.emotions.is_empty() {
                continue;
            }
            let positive = entry
                .emotions
                .iter()
                .filter(|e| self.config.taxonomy.is_positive(&e.emotion))
                .count();
            lighting_groups
                .entry(lighting.to_lowercase())
                .or_default()
                .push(positive as f64 / entry.emotions.len() as f64);
        }

        let mut averages: Vec<(String, f64)> = lighting_groups
            .into_iter()
            .filter(|(_, values)| values.len() >= pa.min_data_points)
            .map(|(lighting, values)| (lighting, mean(&values)))
            .collect();
        averages.sort_by(|a, b| b.1.total_cmp(&a.1));

        if let (Some(best), Some(worst)) = (averages.first(), averages.last()) {
            if averages.len() > 1 && best.1 - worst.1 > pa.concern_frequency_threshold {
                correlations.push(CorrelationResult {
                    factor1: "Lighting Conditions".to_string(),
                    factor2: "Positive Emotions".to_string(),
                    correlation: 0.5,
                    significance: Significance::Moderate,
                    description: format!(
                        "{} lighting shows highest positive emotion rates ({}%)",
                        best.0,
                        (best.1 * 100.0).round()
                    ),
                    recommendations: vec![
                        format!("Optimize for {} lighting when possible", best.0),
                        format!("Minimize exposure to {} lighting during challenging activities", worst.0),
                    ],
                    p_value: None,
                });
            }
        }

        Ok(correlations)
    }
}

fn emotion_recommendations(label: &str, config: &Config) -> Vec<String> {
    if config.taxonomy.is_positive(label) {
        return strings(&[
            "Continue current successful strategies",
            "Document what is working well",
            "Share progress with student and family",
        ]);
    }
    match label {
        "anxious" => strings(&[
            "Introduce predictable routines and visual schedules",
            "Teach breathing and grounding techniques",
            "Provide advance notice of transitions",
        ]),
        "frustrated" | "angry" => strings(&[
            "Break tasks into smaller steps",
            "Offer choices to increase sense of control",
            "Provide a calm-down space",
        ]),
        "sad" => strings(&[
            "Schedule regular check-ins",
            "Encourage positive peer interactions",
        ]),
        "overwhelmed" => strings(&[
            "Reduce task load and sensory demands",
            "Offer structured breaks",
        ]),
        _ => strings(&["Continue monitoring emotional patterns"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{EnvironmentalData, RoomConditions};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn emotion(label: &str, intensity: u8, day: i64) -> EmotionEntry {
        EmotionEntry {
            id: None,
            emotion: label.into(),
            intensity,
            timestamp: start() + Duration::days(day),
            triggers: vec![],
        }
    }

    fn sensory(response: &str, day: i64) -> SensoryEntry {
        SensoryEntry {
            id: None,
            sensory_type: "tactile".into(),
            response: response.into(),
            intensity: None,
            timestamp: start() + Duration::days(day),
        }
    }

    #[test]
    fn test_high_intensity_negative_and_consistency() {
        let config = Config::default();
        let emotions: Vec<_> = (0..10).map(|d| emotion("Anxious", if d < 6 { 5 } else { 2 }, d)).collect();
        let detector = PatternDetector::new(&config, start() + Duration::days(10));
        let patterns = detector.emotion_patterns(&emotions).unwrap();

        let names: Vec<&str> = patterns.iter().map(|p| p.pattern.as_str()).collect();
        assert!(names.contains(&"high-intensity-negative"));
        assert!(names.contains(&"consistent-emotion"));
        assert!(!names.contains(&"moderate-negative-trend"));
    }

    #[test]
    fn test_moderate_negative_when_no_high_intensity() {
        let config = Config::default();
        let emotions: Vec<_> = (0..10)
            .map(|d| if d % 2 == 0 { emotion("sad", 3, d) } else { emotion("frustrated", 3, d) })
            .collect();
        let detector = PatternDetector::new(&config, start() + Duration::days(10));
        let patterns = detector.emotion_patterns(&emotions).unwrap();
        assert!(patterns.iter().any(|p| p.pattern == "moderate-negative-trend"));
    }

    #[test]
    fn test_window_excludes_old_data_and_invalid_intensity_fails() {
        let config = Config::default();
        let emotions: Vec<_> = (0..5).map(|d| emotion("anxious", 5, d)).collect();
        let detector = PatternDetector::new(&config, start() + Duration::days(120));
        assert!(detector.emotion_patterns(&emotions).unwrap().is_empty());

        let bad = vec![emotion("calm", 9, 0); 4];
        assert!(matches!(detector.emotion_patterns(&bad), Err(AnalyticsError::InvalidInput(_))));
    }

    #[test]
    fn test_sensory_dominance_and_prevalence() {
        let config = Config::default();
        let detector = PatternDetector::new(&config, start() + Duration::days(10));

        let mut inputs: Vec<_> = (0..6).map(|d| sensory("Seeking movement", d)).collect();
        inputs.push(sensory("avoiding", 7));
        let patterns = detector.sensory_patterns(&inputs).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "sensory-seeking");

        let only_avoiding: Vec<_> = (0..3).map(|d| sensory("covering ears", d)).collect();
        let patterns = detector.sensory_patterns(&only_avoiding).unwrap();
        assert_eq!(patterns[0].pattern, "sensory-avoiding");
        assert!(patterns[0].description.starts_with("Prevalent"));
    }

    #[test]
    fn test_noise_intensity_correlation() {
        let config = Config::default();
        let entries: Vec<TrackingEntry> = (0..8)
            .map(|i| TrackingEntry {
                id: format!("e{}", i),
                student_id: "s1".into(),
                timestamp: start() + Duration::days(i),
                emotions: vec![emotion("anxious", (1 + i / 2) as u8, i)],
                sensory_inputs: vec![],
                environmental_data: Some(EnvironmentalData {
                    room_conditions: Some(RoomConditions {
                        noise_level: Some(40.0 + 5.0 * i as f64),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                notes: None,
            })
            .collect();
        let detector = PatternDetector::new(&config, start() + Duration::days(8));
        let correlations = detector.environmental_correlations(&entries).unwrap();
        assert_eq!(correlations.len(), 1);
        assert!(correlations[0].correlation > 0.9);
        assert_eq!(correlations[0].significance, Significance::High);
    }
}
