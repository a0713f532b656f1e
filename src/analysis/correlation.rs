// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Correlation matrix over session factors

use serde::{Deserialize, Serialize};

use super::statistics::{correlation_p_value, pearson};
use super::Significance;
use crate::config::Config;
use crate::tracking::{ResponseKind, TrackingEntry};

/// Numeric factors extracted from every session
pub const FACTORS: [&str; 6] = [
    "avgEmotionIntensity",
    "positiveEmotionRatio",
    "sensorySeekingRatio",
    "noiseLevel",
    "temperature",
    "lightingQuality",
];

/// Factor pair passing the significance gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificantPair {
    pub factor1: String,
    pub factor2: String,
    pub correlation: f64,
    pub p_value: f64,
    pub significance: Significance,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationMatrix {
    pub factors: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
    /// Sorted by absolute correlation, strongest first
    pub significant_pairs: Vec<SignificantPair>,
}

/// Maps a lighting label to an ordinal quality score
pub fn lighting_score(lighting: &str) -> f64 {
    match lighting.to_lowercase().as_str() {
        "dim" => 1.0,
        "normal" => 2.0,
        "bright" => 3.0,
        "fluorescent" => 2.5,
        "natural" => 3.5,
        _ => 2.0,
    }
}

/// Builds the pairwise factor correlation matrix
pub struct CorrelationAnalyzer<'a> {
    config: &'a Config,
}

impl<'a> CorrelationAnalyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Band cut-offs as (low, moderate, high), forced into ascending order
    pub fn bands(&self) -> (f64, f64, f64) {
        let sig = &self.config.enhanced_analysis.correlation_significance;
        let low = sig.low.clamp(0.0, 1.0);
        let moderate = sig.moderate.clamp(low, 1.0);
        let high = sig.high.clamp(moderate, 1.0);
        (low, moderate, high)
    }

    pub fn significance(&self, r: f64) -> Significance {
        let (_, moderate, high) = self.bands();
        let abs = r.abs();
        if abs >= high {
            Significance::High
        } else if abs >= moderate {
            Significance::Moderate
        } else {
            Significance::Low
        }
    }

    /// Factor values for one session; `None` where the session did not record the factor
    fn factor_values(&self, entry: &TrackingEntry) -> [Option<f64>; 6] {
        let taxonomy = &self.config.taxonomy;
        let emotions = &entry.emotions;
        let sensory = &entry.sensory_inputs;

        let avg_intensity = entry.average_intensity();
        let positive_ratio = if emotions.is_empty() {
            None
        } else {
            let positive = emotions.iter().filter(|e| taxonomy.is_positive(&e.emotion)).count();
            Some(positive as f64 / emotions.len() as f64)
        };
        let seeking_ratio = if sensory.is_empty() {
            None
        } else {
            let seeking = sensory
                .iter()
                .filter(|s| s.response_kind() == ResponseKind::Seeking)
                .count();
            Some(seeking as f64 / sensory.len() as f64)
        };

        let room = entry.room();
        [
            avg_intensity,
            positive_ratio,
            seeking_ratio,
            room.and_then(|r| r.noise_level),
            room.and_then(|r| r.temperature),
            room.and_then(|r| r.lighting.as_deref()).map(lighting_score),
        ]
    }

    pub fn analyze(&self, entries: &[TrackingEntry]) -> CorrelationMatrix {
        let rows: Vec<[Option<f64>; 6]> = entries.iter().map(|e| self.factor_values(e)).collect();
        let (low, _, _) = self.bands();
        let min_samples = self.config.enhanced_analysis.min_sample_size;

        let mut matrix = vec![vec![0.0; FACTORS.len()]; FACTORS.len()];
        let mut significant_pairs = Vec::new();

        for i in 0..FACTORS.len() {
            for j in 0..FACTORS.len() {
                if i == j {
                    matrix[i][j] = 1.0;
                    continue;
                }
                let (x, y): (Vec<f64>, Vec<f64>) = rows
                    .iter()
                    .filter_map(|row| match (row[i], row[j]) {
                        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a, b)),
                        _ => None,
                    })
                    .unzip();

                let r = pearson(&x, &y);
                matrix[i][j] = r;

                if i < j && x.len() >= min_samples && r.abs() >= low && r != 0.0 {
                    significant_pairs.push(SignificantPair {
                        factor1: FACTORS[i].to_string(),
                        factor2: FACTORS[j].to_string(),
                        correlation: r,
                        p_value: correlation_p_value(r, x.len()),
                        significance: self.significance(r),
                        sample_size: x.len(),
                    });
                }
            }
        }

        significant_pairs.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));

        CorrelationMatrix {
            factors: FACTORS.iter().map(|f| f.to_string()).collect(),
            matrix,
            significant_pairs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{EnvironmentalData, RoomConditions};
    use chrono::{Duration, TimeZone, Utc};

    fn rising_entries(count: i64) -> Vec<TrackingEntry> {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        (0..count)
            .map(|i| TrackingEntry {
                id: format!("e{}", i),
                student_id: "s1".into(),
                timestamp: start + Duration::days(i),
                emotions: vec![],
                sensory_inputs: vec![],
                environmental_data: Some(EnvironmentalData {
                    room_conditions: Some(RoomConditions {
                        noise_level: Some(40.0 + 2.0 * i as f64),
                        temperature: Some(19.0 + 0.25 * i as f64 + if i % 2 == 0 { 0.3 } else { -0.3 }),
                        lighting: None,
                        humidity: None,
                    }),
                    ..Default::default()
                }),
                notes: None,
            })
            .collect()
    }

    #[test]
    fn test_rising_noise_and_temperature_pair_is_strong() {
        let config = Config::default();
        let analyzer = CorrelationAnalyzer::new(&config);
        let result = analyzer.analyze(&rising_entries(18));

        let pair = result
            .significant_pairs
            .iter()
            .find(|p| p.factor1 == "noiseLevel" && p.factor2 == "temperature")
            .expect("noise/temperature pair");
        assert!(matches!(pair.significance, Significance::Moderate | Significance::High));
        assert_eq!(pair.sample_size, 18);
        assert!(pair.p_value < 0.05);

        let (low, _, _) = analyzer.bands();
        assert!(result.significant_pairs.iter().all(|p| p.correlation.abs() >= low));
        assert_eq!(result.matrix.len(), FACTORS.len());
    }

    #[test]
    fn test_below_min_sample_size_has_no_pairs() {
        let config = Config::default();
        let result = CorrelationAnalyzer::new(&config).analyze(&rising_entries(4));
        assert!(result.significant_pairs.is_empty());
        assert!(CorrelationAnalyzer::new(&config).analyze(&[]).significant_pairs.is_empty());
    }

    #[test]
    fn test_bands_are_ordered() {
        let mut config = Config::default();
        config.enhanced_analysis.correlation_significance.low = 0.6;
        config.enhanced_analysis.correlation_significance.moderate = 0.4;
        config.enhanced_analysis.correlation_significance.high = 0.5;
        let analyzer = CorrelationAnalyzer::new(&config);
        assert_eq!(analyzer.bands(), (0.6, 0.6, 0.6));
        assert_eq!(analyzer.significance(0.65), Significance::High);
    }

    #[test]
    fn test_lighting_scores() {
        assert_eq!(lighting_score("Natural"), 3.5);
        assert_eq!(lighting_score("unknown"), 2.0);
    }
}
