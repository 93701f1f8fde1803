//! Zero-mean / unit-variance feature scaling.

use crate::metrics::FEATURE_COUNT;
use crate::stats;
use serde::{Deserialize, Serialize};

/// Per-feature standardizer fitted on the training set.
///
/// A feature with zero variance is passed through centered only, so a
/// constant training column cannot produce NaN at inference time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: [f64; FEATURE_COUNT],
    pub stds: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit means and population stds over the sample rows.
    pub fn fit(samples: &[[f64; FEATURE_COUNT]]) -> Self {
        let mut means = [0.0; FEATURE_COUNT];
        let mut stds = [0.0; FEATURE_COUNT];

        for i in 0..FEATURE_COUNT {
            let column: Vec<f64> = samples.iter().map(|row| row[i]).collect();
            means[i] = stats::mean(&column);
            stds[i] = stats::std_dev(&column);
        }

        Self { means, stds }
    }

    pub fn transform(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = if self.stds[i] > 0.0 {
                (row[i] - self.means[i]) / self.stds[i]
            } else {
                row[i] - self.means[i]
            };
        }
        out
    }

    pub fn transform_all(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<[f64; FEATURE_COUNT]> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
