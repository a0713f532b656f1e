// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Deterministic cache keys

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{
    AlertSensitivity, AnalyticsGates, Config, EnhancedAnalysisConfig, PatternAnalysisConfig, Taxonomy, TimeWindows,
};
use crate::error::Result;
use crate::tracking::AnalysisInput;

/// Digest of everything that influences an analysis result.
///
/// Two requests with equal fingerprints are interchangeable; the student id is
/// kept in clear so entries can be invalidated per student.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub student_id: String,
    pub digest: String,
}

/// Configuration that changes results. Cache, worker and storage settings are left out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSlice<'a> {
    schema_version: &'a str,
    time_windows: &'a TimeWindows,
    pattern_analysis: &'a PatternAnalysisConfig,
    enhanced_analysis: &'a EnhancedAnalysisConfig,
    alert_sensitivity: &'a AlertSensitivity,
    taxonomy: &'a Taxonomy,
    analytics: &'a AnalyticsGates,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyMaterial<'a> {
    input: &'a AnalysisInput,
    config: ConfigSlice<'a>,
    use_ai: bool,
}

impl Fingerprint {
    pub fn compute(input: &AnalysisInput, config: &Config, use_ai: bool) -> Result<Self> {
        let material = KeyMaterial {
            input,
            config: ConfigSlice {
                schema_version: &config.schema_version,
                time_windows: &config.time_windows,
                pattern_analysis: &config.pattern_analysis,
                enhanced_analysis: &config.enhanced_analysis,
                alert_sensitivity: &config.alert_sensitivity,
                taxonomy: &config.taxonomy,
                analytics: &config.analytics,
            },
            use_ai,
        };
        let bytes = serde_json::to_vec(&material)?;
        let digest = Sha256::digest(&bytes);

        Ok(Self {
            student_id: input.student_id.clone(),
            digest: digest.iter().map(|b| format!("{:02x}", b)).collect(),
        })
    }

    pub fn belongs_to(&self, student_id: &str) -> bool {
        self.student_id == student_id
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analytics:{}:{}", self.student_id, self.digest)
    }
}
