// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Robust statistics: median/MAD scores, Pearson correlation, Huber regression
//!
//! Every function ignores non-finite input values and returns finite output.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::config::HuberConfig;

/// Scale factor making MAD a consistent estimator of the standard deviation
pub const MAD_NORMAL_CONSTANT: f64 = 1.4826;

/// Scale factor for the mean absolute deviation, used when MAD is zero
pub const MEAN_AD_NORMAL_CONSTANT: f64 = 1.2533;

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn paired(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip()
}

pub fn mean(values: &[f64]) -> f64 {
    let v = finite(values);
    if v.is_empty() {
        return 0.0;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

/// Sample variance (n - 1 denominator)
pub fn variance(values: &[f64]) -> f64 {
    let v = finite(values);
    if v.len() < 2 {
        return 0.0;
    }
    let m = mean(&v);
    v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (v.len() - 1) as f64
}

pub fn median(values: &[f64]) -> f64 {
    let mut v = finite(values);
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}

/// Unscaled median absolute deviation
pub fn mad(values: &[f64]) -> f64 {
    let v = finite(values);
    if v.is_empty() {
        return 0.0;
    }
    let center = median(&v);
    let deviations: Vec<f64> = v.iter().map(|x| (x - center).abs()).collect();
    median(&deviations)
}

/// Robust z-scores around the median, one per input value.
///
/// The scale is `MAD * 1.4826`. When more than half the values are identical
/// MAD is zero, so the scaled mean absolute deviation is used instead. A
/// stream with no spread at all scores zero everywhere.
pub fn robust_z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let v = finite(values);
    let center = median(&v);

    let mut scale = mad(&v) * MAD_NORMAL_CONSTANT;
    if scale <= f64::EPSILON && !v.is_empty() {
        let mean_ad = v.iter().map(|x| (x - center).abs()).sum::<f64>() / v.len() as f64;
        scale = mean_ad * MEAN_AD_NORMAL_CONSTANT;
    }
    if scale <= f64::EPSILON {
        return vec![0.0; values.len()];
    }

    values
        .iter()
        .map(|&x| if x.is_finite() { (x - center) / scale } else { 0.0 })
        .collect()
}

/// Pearson correlation over index-paired finite values; 0 when undefined
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let (xs, ys) = paired(x, y);
    if xs.len() < 2 {
        return 0.0;
    }
    let mx = mean(&xs);
    let my = mean(&ys);

    let mut num = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in xs.iter().zip(ys.iter()) {
        let dx = a - mx;
        let dy = b - my;
        num += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    (num / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Two-sided p-value for a Pearson coefficient over `n` pairs
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if !r.is_finite() || n < 3 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = (r * df.sqrt() / denom.sqrt()).abs();
    let p = match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t)),
        Err(_) => 1.0,
    };
    if p.is_finite() {
        p.clamp(f64::MIN_POSITIVE, 1.0)
    } else {
        1.0
    }
}

/// Fitted line from [`huber_regression`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub slope: f64,
    pub intercept: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl RegressionFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Coefficient of determination against the observed points, in [0, 1]
    pub fn r_squared(&self, x: &[f64], y: &[f64]) -> f64 {
        let (xs, ys) = paired(x, y);
        if xs.len() < 2 {
            return 0.0;
        }
        let my = mean(&ys);
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (a, b) in xs.iter().zip(ys.iter()) {
            ss_res += (b - self.predict(*a)).powi(2);
            ss_tot += (b - my).powi(2);
        }
        if ss_tot <= 0.0 {
            return 0.0;
        }
        let r2 = 1.0 - ss_res / ss_tot;
        if r2.is_finite() {
            r2.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Robust linear fit by iteratively reweighted least squares with Huber weights.
/// Starts from ordinary least squares; residual scale comes from MAD.
pub fn huber_regression(x: &[f64], y: &[f64], params: &HuberConfig) -> RegressionFit {
    let (xs, ys) = paired(x, y);
    if xs.len() < 2 {
        return RegressionFit {
            slope: 0.0,
            intercept: median(&ys),
            iterations: 0,
            converged: false,
        };
    }

    let delta = if params.delta > 0.0 { params.delta } else { 1.345 };
    let max_iter = params.max_iter.max(1);
    let tol = if params.tol > 0.0 { params.tol } else { 1e-6 };

    let mx = mean(&xs);
    let my = mean(&ys);
    let (num, den) = xs
        .iter()
        .zip(ys.iter())
        .fold((0.0, 0.0), |(n, d), (a, b)| (n + (a - mx) * (b - my), d + (a - mx).powi(2)));
    let mut slope = if den > 0.0 { num / den } else { 0.0 };
    let mut intercept = my - slope * mx;

    let mut weights = vec![1.0; xs.len()];
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..max_iter {
        iterations = iter + 1;
        let residuals: Vec<f64> = xs
            .iter()
            .zip(ys.iter())
            .map(|(a, b)| b - (intercept + slope * a))
            .collect();

        let mut scale = mad(&residuals) * MAD_NORMAL_CONSTANT;
        if scale <= 0.0 {
            scale = variance(&residuals).max(1e-12).sqrt();
        }
        let cutoff = delta * scale;
        for (w, r) in weights.iter_mut().zip(residuals.iter()) {
            let ar = r.abs();
            *w = if ar <= cutoff { 1.0 } else { cutoff / ar };
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            break;
        }
        let x_bar = weights.iter().zip(xs.iter()).map(|(w, a)| w * a).sum::<f64>() / total;
        let y_bar = weights.iter().zip(ys.iter()).map(|(w, b)| w * b).sum::<f64>() / total;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for ((w, a), b) in weights.iter().zip(xs.iter()).zip(ys.iter()) {
            sxx += w * (a - x_bar).powi(2);
            sxy += w * (a - x_bar) * (b - y_bar);
        }

        let prev_slope = slope;
        let prev_intercept = intercept;
        if sxx > 0.0 {
            slope = sxy / sxx;
        }
        intercept = y_bar - slope * x_bar;

        if (slope - prev_slope).abs() + (intercept - prev_intercept).abs() < tol {
            converged = true;
            break;
        }
    }

    if !slope.is_finite() || !intercept.is_finite() {
        return RegressionFit {
            slope: 0.0,
            intercept: median(&ys),
            iterations,
            converged: false,
        };
    }

    RegressionFit {
        slope,
        intercept,
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 100.0]), 1.0);
    }

    #[test]
    fn test_robust_z_scores_constant_stream() {
        let z = robust_z_scores(&[3.0; 12]);
        assert_eq!(z.len(), 12);
        assert!(z.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_robust_z_scores_flag_outlier_when_mad_is_zero() {
        let mut values = vec![2.0; 12];
        values.push(5.0);
        let z = robust_z_scores(&values);
        assert!(z[12] > 3.0);
        assert!(z[..12].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_pearson_perfect_and_degenerate() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);

        let inverse: Vec<f64> = x.iter().map(|v| -v).collect();
        assert!((pearson(&x, &inverse) + 1.0).abs() < 1e-12);

        assert_eq!(pearson(&x, &[5.0; 10]), 0.0);
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
    }

    #[test]
    fn test_p_value_behaviour() {
        assert_eq!(correlation_p_value(0.9, 2), 1.0);
        assert_eq!(correlation_p_value(1.0, 10), 0.0);
        let strong = correlation_p_value(0.9, 20);
        let weak = correlation_p_value(0.1, 20);
        assert!(strong < 0.001);
        assert!(weak > 0.5);
        assert!(weak <= 1.0);
    }

    #[test]
    fn test_huber_resists_outlier() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let mut y: Vec<f64> = x.iter().map(|v| 0.5 * v + 2.0).collect();
        y[10] = 100.0;

        let fit = huber_regression(&x, &y, &HuberConfig::default());
        assert!((fit.slope - 0.5).abs() < 0.05, "slope {}", fit.slope);
        assert!((fit.intercept - 2.0).abs() < 0.5, "intercept {}", fit.intercept);
    }

    #[test]
    fn test_huber_degenerate_inputs() {
        let fit = huber_regression(&[1.0], &[4.0], &HuberConfig::default());
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 4.0);

        let x: Vec<f64> = (0..8).map(f64::from).collect();
        let fit = huber_regression(&x, &[2.0; 8], &HuberConfig::default());
        assert_eq!(fit.slope, 0.0);
        assert!(fit.intercept.is_finite());
        assert_eq!(fit.r_squared(&x, &[2.0; 8]), 0.0);
    }
}
