// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Per-student analytics profiles and health scores

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalyticsResults;
use crate::config::HealthScoreWeights;

/// What the engine knows about a student's analytics history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub student_id: String,
    pub created_at: DateTime<Utc>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    /// 0-100, see [`health_score`]
    pub health_score: u8,
    pub has_minimum_data: bool,
}

impl StudentProfile {
    fn new(student_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            created_at: Utc::now(),
            last_analyzed_at: None,
            health_score: 0,
            has_minimum_data: false,
        }
    }
}

/// One row of the engine status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatus {
    pub student_id: String,
    pub is_initialized: bool,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub health_score: u8,
    pub has_minimum_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub student_id: String,
    pub error: String,
}

/// Outcome of refreshing every known student
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    pub failed: Vec<RefreshFailure>,
}

/// Whether a result carries enough signal to count as analyzed data
fn has_minimum_data(results: &AnalyticsResults) -> bool {
    !results.patterns.is_empty() || !results.correlations.is_empty()
}

/// Score how complete and trustworthy a result is, from 0 to 100.
///
/// Each non-empty section earns its weight and the total is scaled by the AI
/// confidence when one is reported. AI runs earn a small bonus: 5 points for a
/// clean provider run, 2 when it fell back, plus one point per lineage source
/// up to three.
pub fn health_score(results: &AnalyticsResults, weights: &HealthScoreWeights) -> u8 {
    let sections = [
        (!results.patterns.is_empty(), weights.patterns),
        (!results.correlations.is_empty(), weights.correlations),
        (!results.predictive_insights.is_empty(), weights.predictions),
        (!results.anomalies.is_empty(), weights.anomalies),
        (has_minimum_data(results), weights.minimum_data),
    ];
    let score: u32 = sections.iter().filter(|(present, _)| *present).map(|(_, w)| w).sum();

    let confidence = results
        .ai
        .as_ref()
        .and_then(|ai| ai.confidence)
        .filter(|c| c.is_finite())
        .map_or(1.0, |c| c.clamp(0.0, 1.0));
    let mut total = (score as f64 * confidence).round() as i64;

    if let Some(ai) = &results.ai {
        let heuristic = ai.provider.eq_ignore_ascii_case("heuristic");
        let fell_back = ai.caveats.iter().any(|c| c.to_lowercase().contains("fallback"));
        total += match (heuristic, fell_back) {
            (false, false) => 5,
            (false, true) => 2,
            _ => 0,
        };
        total += ai.data_lineage.len().min(3) as i64;
    }

    total.clamp(0, 100) as u8
}

/// In-memory profile table
#[derive(Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, StudentProfile>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a profile; false when the id is blank or already known
    pub fn initialize(&self, student_id: &str) -> bool {
        if student_id.trim().is_empty() {
            return false;
        }
        let mut profiles = self.profiles.write();
        if profiles.contains_key(student_id) {
            return false;
        }
        profiles.insert(student_id.to_string(), StudentProfile::new(student_id));
        true
    }

    /// Stamp a finished analysis onto the profile and return its health score
    pub fn record(&self, student_id: &str, results: &AnalyticsResults, weights: &HealthScoreWeights) -> u8 {
        if student_id.trim().is_empty() {
            return 0;
        }
        let score = health_score(results, weights);
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(student_id.to_string())
            .or_insert_with(|| StudentProfile::new(student_id));
        profile.last_analyzed_at = Some(Utc::now());
        profile.health_score = score;
        profile.has_minimum_data = has_minimum_data(results);
        score
    }

    pub fn get(&self, student_id: &str) -> Option<StudentProfile> {
        self.profiles.read().get(student_id).cloned()
    }

    pub fn remove(&self, student_id: &str) -> Option<StudentProfile> {
        self.profiles.write().remove(student_id)
    }

    pub fn status(&self, student_id: &str) -> StudentStatus {
        match self.get(student_id) {
            Some(profile) => StudentStatus {
                student_id: profile.student_id,
                is_initialized: true,
                last_analyzed: profile.last_analyzed_at,
                health_score: profile.health_score,
                has_minimum_data: profile.has_minimum_data,
            },
            None => StudentStatus {
                student_id: student_id.to_string(),
                is_initialized: false,
                last_analyzed: None,
                health_score: 0,
                has_minimum_data: false,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}
