//! Per-feature statistical baselines computed at training time.

use crate::metrics::{FEATURE_COUNT, FEATURE_NAMES};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive statistics for one feature over the training window.
/// Immutable until the next retraining pass; there is no incremental
/// update path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub q25: f64,
    pub q75: f64,
    pub iqr: f64,
    pub min: f64,
    pub max: f64,
}

impl Baseline {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let q25 = stats::percentile(values, 25.0);
        let q75 = stats::percentile(values, 75.0);
        Self {
            mean: stats::mean(values),
            std: stats::std_dev(values),
            median: stats::median(values),
            q25,
            q75,
            iqr: q75 - q25,
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Z-score of a value against this baseline. 0 when std is 0.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.std
        }
    }
}

/// Compute baselines for all monitored features, keyed by feature name.
pub fn compute_baselines(samples: &[[f64; FEATURE_COUNT]]) -> BTreeMap<String, Baseline> {
    let mut out = BTreeMap::new();
    for (i, name) in FEATURE_NAMES.iter().enumerate() {
        let column: Vec<f64> = samples.iter().map(|row| row[i]).collect();
        out.insert(name.to_string(), Baseline::from_values(&column));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_quartiles() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let b = Baseline::from_values(&values);
        assert_eq!(b.min, 1.0);
        assert_eq!(b.max, 100.0);
        assert_eq!(b.median, 50.5);
        assert!((b.iqr - (b.q75 - b.q25)).abs() < 1e-12);
        assert!(b.q25 < b.median && b.median < b.q75);
    }

    #[test]
    fn test_z_score_constant_series_is_zero() {
        let b = Baseline::from_values(&[5.0; 20]);
        assert_eq!(b.std, 0.0);
        assert_eq!(b.z_score(100.0), 0.0);
    }

    #[test]
    fn test_compute_baselines_covers_all_features() {
        let samples = vec![[1.0, 2.0, 3.0, 4.0, 5.0]; 12];
        let baselines = compute_baselines(&samples);
        assert_eq!(baselines.len(), FEATURE_COUNT);
        assert_eq!(baselines["error_rate"].mean, 5.0);
    }
}
