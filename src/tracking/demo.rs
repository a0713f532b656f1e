// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Synthetic tracking data for demos and tests

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use super::{EmotionEntry, EnvironmentalData, Goal, GoalDataPoint, RoomConditions, SensoryEntry, TrackingEntry};

const EMOTIONS: [&str; 8] = ["happy", "calm", "excited", "content", "anxious", "frustrated", "overwhelmed", "sad"];
const SENSORY_TYPES: [&str; 5] = ["auditory", "visual", "tactile", "vestibular", "proprioceptive"];
const SEEKING: [&str; 3] = ["seeking", "craving movement", "seeking pressure"];
const AVOIDING: [&str; 3] = ["avoiding", "covering ears", "avoiding touch"];
const LIGHTING: [&str; 4] = ["natural", "bright", "dim", "fluorescent"];
const ACTIVITIES: [&str; 5] = ["instruction", "transition", "free-time", "testing", "group-work"];

/// Generates plausible sessions for one student.
///
/// A seeded generator always yields the same data, which keeps fingerprints
/// and cached results stable across runs.
pub struct DemoDataGenerator {
    student_id: String,
    rng: StdRng,
    /// Daily drift applied to baseline intensity
    stress_drift: f64,
    noise_sd: f64,
}

impl DemoDataGenerator {
    pub fn new(student_id: &str) -> Self {
        Self::with_rng(student_id, StdRng::from_entropy())
    }

    pub fn seeded(student_id: &str, seed: u64) -> Self {
        Self::with_rng(student_id, StdRng::seed_from_u64(seed))
    }

    fn with_rng(student_id: &str, rng: StdRng) -> Self {
        Self {
            student_id: student_id.to_string(),
            rng,
            stress_drift: 0.0,
            noise_sd: 0.8,
        }
    }

    /// Make intensity trend upward (positive) or downward over time
    pub fn with_stress_drift(mut self, per_day: f64) -> Self {
        self.stress_drift = per_day;
        self
    }

    /// `per_day` sessions for each of the last `days` days, oldest first
    pub fn generate_entries(&mut self, days: u32, per_day: u32) -> Vec<TrackingEntry> {
        let end = Utc::now().with_nanosecond(0).unwrap_or_else(Utc::now);
        self.generate_entries_until(end, days, per_day)
    }

    pub fn generate_entries_until(&mut self, end: DateTime<Utc>, days: u32, per_day: u32) -> Vec<TrackingEntry> {
        let mut entries = Vec::with_capacity((days * per_day) as usize);
        for day in 0..days {
            let day_start = end - Duration::days(i64::from(days - day));
            for slot in 0..per_day {
                let offset_minutes = 8 * 60 + i64::from(slot) * (6 * 60 / i64::from(per_day.max(1)));
                let timestamp = day_start + Duration::minutes(offset_minutes);
                let index = entries.len();
                entries.push(self.session(index, timestamp, f64::from(day)));
            }
        }
        entries
    }

    fn session(&mut self, index: usize, timestamp: DateTime<Utc>, day: f64) -> TrackingEntry {
        let noise_level: f64 = 40.0 + self.rng.gen_range(0.0..35.0);
        // Louder rooms push intensity up
        let loudness = (noise_level - 55.0) / 15.0;

        let emotion_count = self.rng.gen_range(1..=2);
        let emotions = (0..emotion_count)
            .map(|_| {
                let jitter: f64 = self.rng.sample(StandardNormal);
                let raw = 2.5 + loudness + self.stress_drift * day + jitter * self.noise_sd;
                let negative = raw > 3.0 && self.rng.gen_bool(0.7);
                let label = if negative {
                    EMOTIONS[self.rng.gen_range(4..8)]
                } else {
                    EMOTIONS[self.rng.gen_range(0..4)]
                };
                EmotionEntry {
                    id: None,
                    emotion: label.to_string(),
                    intensity: raw.round().clamp(1.0, 5.0) as u8,
                    timestamp,
                    triggers: Vec::new(),
                }
            })
            .collect();

        let sensory_count = self.rng.gen_range(0..=2);
        let sensory_inputs = (0..sensory_count)
            .map(|_| {
                let avoid = self.rng.gen_bool(if loudness > 0.5 { 0.7 } else { 0.3 });
                let response = if avoid {
                    AVOIDING[self.rng.gen_range(0..AVOIDING.len())]
                } else {
                    SEEKING[self.rng.gen_range(0..SEEKING.len())]
                };
                SensoryEntry {
                    id: None,
                    sensory_type: SENSORY_TYPES[self.rng.gen_range(0..SENSORY_TYPES.len())].to_string(),
                    response: response.to_string(),
                    intensity: Some(self.rng.gen_range(1..=5)),
                    timestamp,
                }
            })
            .collect();

        TrackingEntry {
            id: format!("{}-demo-{}", self.student_id, index),
            student_id: self.student_id.clone(),
            timestamp,
            emotions,
            sensory_inputs,
            environmental_data: Some(EnvironmentalData {
                room_conditions: Some(RoomConditions {
                    noise_level: Some((noise_level * 10.0).round() / 10.0),
                    temperature: Some(((20.0 + self.rng.gen_range(0.0..5.0_f64)) * 10.0).round() / 10.0),
                    lighting: Some(LIGHTING[self.rng.gen_range(0..LIGHTING.len())].to_string()),
                    humidity: Some(self.rng.gen_range(35.0..60.0_f64).round()),
                }),
                location: Some("classroom".to_string()),
                classroom_activity: Some(ACTIVITIES[self.rng.gen_range(0..ACTIVITIES.len())].to_string()),
            }),
            notes: None,
        }
    }

    /// Goals with weekly progress points leading up to `end`
    pub fn generate_goals(&mut self, end: DateTime<Utc>, weeks: u32) -> Vec<Goal> {
        let titles = [
            ("Use calming strategy independently", 10.0),
            ("Remain on task for 15 minutes", 15.0),
        ];
        titles
            .iter()
            .enumerate()
            .map(|(i, (title, target))| {
                let mut value = target * 0.2;
                let data_points = (0..weeks)
                    .map(|w| {
                        value = (value + target * self.rng.gen_range(0.02..0.12_f64)).min(*target);
                        GoalDataPoint {
                            timestamp: end - Duration::weeks(i64::from(weeks - w)),
                            value: (value * 10.0).round() / 10.0,
                            notes: None,
                        }
                    })
                    .collect();
                Goal {
                    id: format!("{}-goal-{}", self.student_id, i),
                    student_id: self.student_id.clone(),
                    title: title.to_string(),
                    description: String::new(),
                    target_value: *target,
                    target_date: Some(end + Duration::weeks(8)),
                    data_points,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_seeded_generator_is_deterministic() {
        let end = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let a = DemoDataGenerator::seeded("s1", 7).generate_entries_until(end, 10, 2);
        let b = DemoDataGenerator::seeded("s1", 7).generate_entries_until(end, 10, 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_entries_are_valid_and_ordered() {
        let end = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let entries = DemoDataGenerator::seeded("s1", 3).generate_entries_until(end, 14, 3);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(entries.iter().all(|e| e.timestamp < end));
        for entry in &entries {
            assert!(!entry.emotions.is_empty());
            assert!(entry.emotions.iter().all(|e| (1..=5).contains(&e.intensity)));
            assert!(entry.room().and_then(|r| r.noise_level).is_some());
        }
    }

    #[test]
    fn test_goals_progress_toward_target() {
        let end = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let goals = DemoDataGenerator::seeded("s1", 1).generate_goals(end, 6);
        assert_eq!(goals.len(), 2);
        for goal in goals {
            assert_eq!(goal.data_points.len(), 6);
            assert!(goal.data_points.windows(2).all(|w| w[0].value <= w[1].value));
            assert!(goal.data_points.iter().all(|p| p.value <= goal.target_value));
        }
    }
}
