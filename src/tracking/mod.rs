// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Tracking records and analysis inputs
//!
//! Entries are read-only inside the engine. Field names serialize in
//! camelCase so payloads match the JSON produced by the tracking frontend.

pub mod demo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation session for a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub id: String,
    pub student_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub emotions: Vec<EmotionEntry>,
    #[serde(default)]
    pub sensory_inputs: Vec<SensoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_data: Option<EnvironmentalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TrackingEntry {
    /// Average emotion intensity for the session, if any emotion was logged
    pub fn average_intensity(&self) -> Option<f64> {
        if self.emotions.is_empty() {
            return None;
        }
        let total: f64 = self.emotions.iter().map(|e| e.intensity_value()).sum();
        Some(total / self.emotions.len() as f64)
    }

    pub fn room(&self) -> Option<&RoomConditions> {
        self.environmental_data.as_ref()?.room_conditions.as_ref()
    }
}

/// Emotion observed during a session, intensity on a 1-5 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub emotion: String,
    pub intensity: u8,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
}

impl EmotionEntry {
    pub fn intensity_value(&self) -> f64 {
        f64::from(self.intensity)
    }

    /// Lowercased label used for taxonomy lookups
    pub fn label(&self) -> String {
        self.emotion.to_lowercase()
    }
}

/// Sensory response observed during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub sensory_type: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Coarse classification of a free-text sensory response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Seeking,
    Avoiding,
    Neutral,
}

impl SensoryEntry {
    pub fn response_kind(&self) -> ResponseKind {
        let response = self.response.to_lowercase();
        if response.contains("seeking") || response.contains("craving") {
            ResponseKind::Seeking
        } else if response.contains("avoiding") || response.contains("covering") {
            ResponseKind::Avoiding
        } else {
            ResponseKind::Neutral
        }
    }
}

/// Environmental context recorded with a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_conditions: Option<RoomConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classroom_activity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConditions {
    /// Noise level in dB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,
    /// Temperature in degrees Celsius
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

/// Intervention goal with recorded progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub student_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_points: Vec<GoalDataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Everything one analysis run looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub student_id: String,
    #[serde(default)]
    pub entries: Vec<TrackingEntry>,
    #[serde(default)]
    pub emotions: Vec<EmotionEntry>,
    #[serde(default)]
    pub sensory_inputs: Vec<SensoryEntry>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl AnalysisInput {
    /// Build an input from entries, flattening their emotions and sensory inputs
    pub fn from_entries(student_id: &str, entries: Vec<TrackingEntry>, goals: Vec<Goal>) -> Self {
        let emotions = entries.iter().flat_map(|e| e.emotions.iter().cloned()).collect();
        let sensory_inputs = entries.iter().flat_map(|e| e.sensory_inputs.iter().cloned()).collect();
        Self {
            student_id: student_id.to_string(),
            entries,
            emotions,
            sensory_inputs,
            goals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.emotions.is_empty() && self.sensory_inputs.is_empty()
    }

    /// Number of sessions; loose observations count individually when no entries were given
    pub fn session_count(&self) -> usize {
        if self.entries.is_empty() {
            self.emotions.len().max(self.sensory_inputs.len())
        } else {
            self.entries.len()
        }
    }

    /// Newest timestamp in the data; windows are anchored here so a given
    /// input always produces the same result.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.entries
            .iter()
            .map(|e| e.timestamp)
            .chain(self.emotions.iter().map(|e| e.timestamp))
            .chain(self.sensory_inputs.iter().map(|s| s.timestamp))
            .max()
            .unwrap_or_else(Utc::now)
    }
}
