// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Predictive insights: forecasts, goal achievement and risk assessment

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::patterns::validate_emotions;
use super::trend::{TimePoint, TrendAnalysis, TrendAnalyzer, TrendDirection};
use super::Severity;
use crate::config::Config;
use crate::error::Result;
use crate::tracking::{EmotionEntry, Goal, ResponseKind, SensoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Prediction,
    Trend,
    Recommendation,
    Risk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSource {
    Statistical,
    Ml,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    pub trend: TrendDirection,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsight {
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<InsightSource>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Produces forecasts from trends, goal progress and recent stress
pub struct PredictiveAnalyzer<'a> {
    config: &'a Config,
    reference: DateTime<Utc>,
}

impl<'a> PredictiveAnalyzer<'a> {
    pub fn new(config: &'a Config, reference: DateTime<Utc>) -> Self {
        Self { config, reference }
    }

    pub fn emotion_trend(&self, emotions: &[EmotionEntry]) -> TrendAnalysis {
        let points: Vec<TimePoint> = emotions
            .iter()
            .map(|e| TimePoint::new(e.intensity_value(), e.timestamp))
            .collect();
        TrendAnalyzer::new(self.config).analyze("Emotion Intensity", &points)
    }

    /// Seeking scores +1, avoiding -1, neutral 0
    pub fn sensory_trend(&self, sensory: &[SensoryEntry]) -> TrendAnalysis {
        let points: Vec<TimePoint> = sensory
            .iter()
            .map(|s| {
                let value = match s.response_kind() {
                    ResponseKind::Seeking => 1.0,
                    ResponseKind::Avoiding => -1.0,
                    ResponseKind::Neutral => 0.0,
                };
                TimePoint::new(value, s.timestamp)
            })
            .collect();
        TrendAnalyzer::new(self.config).analyze("Sensory Response", &points)
    }

    pub fn insights(
        &self,
        emotions: &[EmotionEntry],
        sensory: &[SensoryEntry],
        goals: &[Goal],
    ) -> Result<Vec<PredictiveInsight>> {
        validate_emotions(emotions)?;
        let mut insights = Vec::new();

        let emotion_trend = self.emotion_trend(emotions);
        if emotion_trend.is_reportable(self.config) {
            insights.push(PredictiveInsight {
                insight_type: InsightType::Prediction,
                title: "Emotional Well-being Forecast".to_string(),
                description: format!(
                    "Based on current trends, emotional intensity is {}",
                    direction_word(emotion_trend.direction)
                ),
                confidence: emotion_trend.significance,
                timeframe: format!("{}-day forecast", self.config.time_windows.recent_data_days),
                prediction: Some(Prediction {
                    value: emotion_trend.forecast.next_7_days,
                    trend: emotion_trend.direction,
                    accuracy: emotion_trend.confidence,
                }),
                recommendations: emotion_trend_recommendations(emotion_trend.direction),
                severity: Some(self.trend_severity(&emotion_trend)),
                source: Some(InsightSource::Statistical),
            });
        }

        let sensory_trend = self.sensory_trend(sensory);
        if sensory_trend.is_reportable(self.config) {
            insights.push(PredictiveInsight {
                insight_type: InsightType::Prediction,
                title: "Sensory Regulation Forecast".to_string(),
                description: format!(
                    "Sensory seeking/avoiding patterns show {} trend",
                    direction_word(sensory_trend.direction)
                ),
                confidence: sensory_trend.significance,
                timeframe: format!("{}-day forecast", self.config.time_windows.short_term_days),
                prediction: Some(Prediction {
                    value: sensory_trend.forecast.next_7_days,
                    trend: sensory_trend.direction,
                    accuracy: sensory_trend.confidence,
                }),
                recommendations: sensory_trend_recommendations(sensory_trend.rate),
                severity: Some(self.trend_severity(&sensory_trend)),
                source: Some(InsightSource::Statistical),
            });
        }

        insights.extend(goals.iter().filter_map(|g| self.goal_achievement(g)));
        insights.extend(self.assess_risks(emotions));

        Ok(insights)
    }

    fn trend_severity(&self, trend: &TrendAnalysis) -> Severity {
        let bands = &self.config.enhanced_analysis.correlation_significance;
        match trend.direction {
            TrendDirection::Decreasing if trend.significance >= bands.high => Severity::High,
            TrendDirection::Decreasing if trend.significance >= bands.moderate => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Days-to-target estimate from goal progress; needs `min_sample_size` data points
    pub fn goal_achievement(&self, goal: &Goal) -> Option<PredictiveInsight> {
        if goal.data_points.len() < 3 {
            return None;
        }
        let points: Vec<TimePoint> = goal
            .data_points
            .iter()
            .map(|dp| TimePoint::new(dp.value, dp.timestamp))
            .collect();
        let trend = TrendAnalyzer::new(self.config).analyze(&goal.title, &points);
        // Too short for a fitted rate; no forecast either way
        if trend.sample_size < self.config.enhanced_analysis.min_sample_size {
            return None;
        }

        let current = goal.data_points.iter().max_by_key(|dp| dp.timestamp)?.value;
        let remaining = goal.target_value - current;
        let estimated_days = if trend.rate > 0.0 { Some(remaining / trend.rate) } else { None };

        let (description, severity, recommendations) = match estimated_days {
            Some(days) if days > 0.0 => (
                format!("Estimated {} days to achieve goal at current pace", days.ceil()),
                if days > 60.0 { Severity::Medium } else { Severity::Low },
                if days > 90.0 {
                    strings(&[
                        "Increase intervention frequency",
                        "Add additional support strategies",
                        "Review goal expectations",
                    ])
                } else {
                    strings(&[
                        "Continue current approach",
                        "Monitor progress regularly",
                        "Celebrate milestones reached",
                    ])
                },
            ),
            Some(_) => (
                "Goal target reached at current pace".to_string(),
                Severity::Low,
                strings(&["Celebrate milestones reached", "Consider setting a new target"]),
            ),
            None => (
                "Goal may require strategy adjustment based on current trend".to_string(),
                Severity::High,
                strings(&[
                    "Review and adjust goal strategies",
                    "Break goal into smaller milestones",
                    "Identify and address barriers",
                ]),
            ),
        };

        Some(PredictiveInsight {
            insight_type: InsightType::Prediction,
            title: format!("Goal Achievement Forecast: {}", goal.title),
            description,
            confidence: trend.significance,
            timeframe: "Goal completion forecast".to_string(),
            prediction: Some(Prediction {
                value: goal.target_value,
                trend: trend.direction,
                accuracy: trend.significance,
            }),
            recommendations,
            severity: Some(severity),
            source: Some(InsightSource::Statistical),
        })
    }

    /// Stress accumulation risk over the short-term window
    pub fn assess_risks(&self, emotions: &[EmotionEntry]) -> Vec<PredictiveInsight> {
        let window = self.config.time_windows.short_term_days.max(1);
        let cutoff = self.reference - Duration::days(window);
        let risk = &self.config.enhanced_analysis.risk_assessment;
        if risk.stress_emotions.is_empty() {
            return Vec::new();
        }

        let incidents = emotions
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .filter(|e| e.intensity_value() >= risk.stress_intensity_threshold)
            .filter(|e| risk.stress_emotions.iter().any(|s| s.eq_ignore_ascii_case(&e.emotion)))
            .count();

        if incidents == 0 || incidents < risk.incidents_threshold.max(1) {
            return Vec::new();
        }

        vec![PredictiveInsight {
            insight_type: InsightType::Risk,
            title: "Stress Accumulation Risk".to_string(),
            description: format!("{} high-stress incidents in the past {} days", incidents, window),
            confidence: 0.8,
            timeframe: "Immediate attention needed".to_string(),
            prediction: None,
            recommendations: strings(&[
                "Implement immediate stress reduction strategies",
                "Review and adjust current interventions",
                "Consider environmental modifications",
                "Schedule additional support sessions",
            ]),
            severity: Some(Severity::High),
            source: Some(InsightSource::Statistical),
        }]
    }
}

fn direction_word(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
        TrendDirection::Stable => "stable",
    }
}

fn emotion_trend_recommendations(direction: TrendDirection) -> Vec<String> {
    match direction {
        TrendDirection::Decreasing => strings(&[
            "Increase positive reinforcement strategies",
            "Review environmental factors that may be contributing to stress",
            "Schedule more frequent check-ins",
        ]),
        TrendDirection::Increasing => strings(&[
            "Continue current successful strategies",
            "Document what is working well",
            "Share progress with student and family",
        ]),
        TrendDirection::Stable => strings(&[
            "Monitor for changes in patterns",
            "Maintain current support level",
        ]),
    }
}

fn sensory_trend_recommendations(rate: f64) -> Vec<String> {
    if rate > 0.0 {
        strings(&[
            "Provide more structured sensory breaks",
            "Introduce additional sensory tools",
            "Monitor for overstimulation",
        ])
    } else if rate < 0.0 {
        strings(&[
            "Reduce environmental stimuli",
            "Provide more quiet spaces",
            "Focus on calming strategies",
        ])
    } else {
        strings(&[
            "Maintain current sensory support level",
            "Continue monitoring sensory preferences",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::GoalDataPoint;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn goal(values: &[f64], target: f64) -> Goal {
        Goal {
            id: "g1".into(),
            student_id: "s1".into(),
            title: "Use calm-down corner".into(),
            description: String::new(),
            target_value: target,
            target_date: None,
            data_points: values
                .iter()
                .enumerate()
                .map(|(i, v)| GoalDataPoint {
                    timestamp: start() + Duration::days(i as i64 * 2),
                    value: *v,
                    notes: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_goal_estimate_from_progress() {
        let config = Config::default();
        let analyzer = PredictiveAnalyzer::new(&config, start());
        let insight = analyzer.goal_achievement(&goal(&[10.0, 20.0, 30.0, 40.0, 50.0], 100.0)).unwrap();
        assert!(insight.description.contains("Estimated 10 days"));
        assert_eq!(insight.severity, Some(Severity::Low));

        let stalled = analyzer.goal_achievement(&goal(&[50.0, 40.0, 30.0, 20.0, 10.0], 100.0)).unwrap();
        assert_eq!(stalled.severity, Some(Severity::High));

        assert!(analyzer.goal_achievement(&goal(&[1.0, 2.0], 10.0)).is_none());
    }

    #[test]
    fn test_short_goal_series_gives_no_forecast() {
        let config = Config::default();
        let analyzer = PredictiveAnalyzer::new(&config, start());
        assert!(analyzer.goal_achievement(&goal(&[10.0, 20.0, 30.0, 40.0], 100.0)).is_none());
        assert!(analyzer.goal_achievement(&goal(&[40.0, 30.0, 20.0], 100.0)).is_none());
    }

    #[test]
    fn test_stress_accumulation_risk() {
        let config = Config::default();
        let emotions: Vec<EmotionEntry> = (0..4)
            .map(|d| EmotionEntry {
                id: None,
                emotion: "Overwhelmed".into(),
                intensity: 5,
                timestamp: start() + Duration::days(d),
                triggers: vec![],
            })
            .collect();
        let analyzer = PredictiveAnalyzer::new(&config, start() + Duration::days(5));
        let risks = analyzer.assess_risks(&emotions);
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].insight_type, InsightType::Risk);

        let later = PredictiveAnalyzer::new(&config, start() + Duration::days(40));
        assert!(later.assess_risks(&emotions).is_empty());
    }

    #[test]
    fn test_strong_emotion_trend_is_reported() {
        let config = Config::default();
        let emotions: Vec<EmotionEntry> = (0..10)
            .map(|d| EmotionEntry {
                id: None,
                emotion: "calm".into(),
                intensity: 5 - (d / 3) as u8,
                timestamp: start() + Duration::days(d * 3),
                triggers: vec![],
            })
            .collect();
        let analyzer = PredictiveAnalyzer::new(&config, start() + Duration::days(30));
        let insights = analyzer.insights(&emotions, &[], &[]).unwrap();
        let forecast = insights
            .iter()
            .find(|i| i.title == "Emotional Well-being Forecast")
            .expect("forecast");
        assert_eq!(forecast.prediction.as_ref().unwrap().trend, TrendDirection::Decreasing);
    }
}
