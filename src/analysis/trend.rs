// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Trend analysis over irregular time series

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::statistics::huber_regression;
use crate::config::Config;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One observation in a time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl TimePoint {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub next_7_days: f64,
    pub next_30_days: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub metric: String,
    pub direction: TrendDirection,
    /// Slope in value units per day
    pub rate: f64,
    /// R² of the robust fit
    pub significance: f64,
    pub confidence: f64,
    pub sample_size: usize,
    pub forecast: Forecast,
}

impl TrendAnalysis {
    /// Neutral result for series too short or flat to fit
    pub fn stable(metric: &str, sample_size: usize, level: f64) -> Self {
        let level = if level.is_finite() { level } else { 0.0 };
        Self {
            metric: metric.to_string(),
            direction: TrendDirection::Stable,
            rate: 0.0,
            significance: 0.0,
            confidence: 0.0,
            sample_size,
            forecast: Forecast {
                next_7_days: level,
                next_30_days: level,
                confidence: 0.0,
            },
        }
    }

    /// Whether the fit is strong enough to report as a forecast
    pub fn is_reportable(&self, config: &Config) -> bool {
        self.sample_size >= config.enhanced_analysis.min_sample_size
            && self.significance >= config.enhanced_analysis.prediction_confidence_threshold
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Fits a robust linear trend where x is days since the first observation.
pub struct TrendAnalyzer<'a> {
    config: &'a Config,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn analyze(&self, metric: &str, data: &[TimePoint]) -> TrendAnalysis {
        let mut points: Vec<TimePoint> = data.iter().copied().filter(|p| p.value.is_finite()).collect();
        points.sort_by_key(|p| p.timestamp);

        let n = points.len();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let level = super::statistics::mean(&values);
        if n < self.config.enhanced_analysis.min_sample_size.max(2) {
            return TrendAnalysis::stable(metric, n, level);
        }

        let origin = points[0].timestamp;
        let days: Vec<f64> = points
            .iter()
            .map(|p| (p.timestamp - origin).num_seconds() as f64 / SECONDS_PER_DAY)
            .collect();
        let span_days = days.last().copied().unwrap_or(0.0);
        if span_days <= 0.0 {
            return TrendAnalysis::stable(metric, n, level);
        }

        let fit = huber_regression(&days, &values, &self.config.enhanced_analysis.huber);
        let rate = finite_or_zero(fit.slope);
        let r_squared = fit.r_squared(&days, &values);

        let targets = &self.config.enhanced_analysis.quality_targets;
        let data_quality = if targets.points_target > 0 {
            (n as f64 / targets.points_target as f64).min(1.0)
        } else {
            0.0
        };
        let span_quality = if targets.time_span_days_target > 0.0 {
            (span_days / targets.time_span_days_target).min(1.0)
        } else {
            0.0
        };
        let confidence = finite_or_zero(data_quality * 0.3 + span_quality * 0.3 + r_squared * 0.4);

        let threshold = self.config.enhanced_analysis.trend_threshold.abs();
        let direction = if rate.abs() < threshold {
            TrendDirection::Stable
        } else if rate > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        let last = finite_or_zero(fit.predict(span_days));
        let windows = &self.config.time_windows;
        let next_7 = last + rate * windows.recent_data_days as f64;
        let next_30 = last + rate * windows.default_analysis_days as f64;

        TrendAnalysis {
            metric: metric.to_string(),
            direction,
            rate,
            significance: r_squared,
            confidence,
            sample_size: n,
            forecast: Forecast {
                next_7_days: finite_or_zero(next_7),
                next_30_days: finite_or_zero(next_30),
                confidence,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(slope: f64, len: i64) -> Vec<TimePoint> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        (0..len)
            .map(|d| TimePoint::new(3.0 + slope * d as f64, start + Duration::days(d)))
            .collect()
    }

    #[test]
    fn test_increasing_trend_rate_is_per_day() {
        let config = Config::default();
        let trend = TrendAnalyzer::new(&config).analyze("intensity", &series(0.1, 20));
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.rate - 0.1).abs() < 1e-6);
        assert!(trend.significance > 0.99);
        assert!((trend.forecast.next_7_days - (3.0 + 0.1 * 19.0 + 0.7)).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_above_slope_flips_to_stable() {
        let mut config = Config::default();
        let data = series(0.05, 20);

        config.enhanced_analysis.trend_threshold = 0.01;
        assert_eq!(TrendAnalyzer::new(&config).analyze("x", &data).direction, TrendDirection::Increasing);

        config.enhanced_analysis.trend_threshold = 0.06;
        assert_eq!(TrendAnalyzer::new(&config).analyze("x", &data).direction, TrendDirection::Stable);

        let falling = series(-0.05, 20);
        assert_eq!(TrendAnalyzer::new(&config).analyze("x", &falling).direction, TrendDirection::Stable);
    }

    #[test]
    fn test_constant_series_is_stable_and_finite() {
        let config = Config::default();
        let trend = TrendAnalyzer::new(&config).analyze("x", &series(0.0, 15));
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.rate, 0.0);
        assert!(trend.confidence.is_finite());
        assert!(trend.forecast.next_30_days.is_finite());
        assert_eq!(trend.significance, 0.0);
    }

    #[test]
    fn test_short_or_instant_series_is_neutral() {
        let config = Config::default();
        let short = TrendAnalyzer::new(&config).analyze("x", &series(1.0, 3));
        assert_eq!(short.direction, TrendDirection::Stable);
        assert!(!short.is_reportable(&config));

        let at = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let same_time: Vec<TimePoint> = (0..6).map(|i| TimePoint::new(i as f64, at)).collect();
        let trend = TrendAnalyzer::new(&config).analyze("x", &same_time);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert!(trend.forecast.next_7_days.is_finite());
    }
}
