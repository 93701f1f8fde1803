//! Isolation-forest outlier scorer.
//!
//! An ensemble of randomized binary trees over the scaled feature space.
//! Points that isolate in few random splits are anomalous. The public
//! contract is just "train on rows, score a row"; the detector layers
//! threshold calibration and score normalization on top.

use crate::metrics::FEATURE_COUNT;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const DEFAULT_SUBSAMPLE: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_estimators: usize,
    pub random_state: u64,
    subsample_size: usize,
    trees: Vec<Node>,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, random_state: u64) -> Self {
        Self {
            n_estimators,
            random_state,
            subsample_size: 0,
            trees: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit the ensemble on scaled feature rows. Deterministic for a
    /// fixed seed and input order.
    pub fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]]) {
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let psi = rows.len().min(DEFAULT_SUBSAMPLE);
        let height_limit = (psi as f64).log2().ceil() as usize;

        self.subsample_size = psi;
        self.trees = (0..self.n_estimators)
            .map(|_| {
                let sample = sample_without_replacement(&mut rng, rows.len(), psi);
                let subset: Vec<[f64; FEATURE_COUNT]> =
                    sample.iter().map(|&i| rows[i]).collect();
                build_tree(&subset, 0, height_limit, &mut rng)
            })
            .collect();
    }

    /// Raw anomaly score for one scaled row. Negative = anomalous,
    /// positive = typical, range roughly [-0.5, 0.5].
    pub fn score(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let avg_path: f64 = self
            .trees
            .iter()
            .map(|t| path_length(t, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        let c = average_path_length(self.subsample_size);
        let anomaly_measure = if c > 0.0 {
            2f64.powf(-avg_path / c)
        } else {
            0.5
        };

        // Shift so that typical points land positive, anomalies negative.
        0.5 - anomaly_measure
    }
}

fn sample_without_replacement(rng: &mut StdRng, n: usize, k: usize) -> Vec<usize> {
    // Partial Fisher-Yates over an index vector
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

fn build_tree(
    rows: &[[f64; FEATURE_COUNT]],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if rows.len() <= 1 || depth >= height_limit {
        return Node::Leaf { size: rows.len() };
    }

    // Only features with spread can be split on
    let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
        .filter_map(|f| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for row in rows {
                min = min.min(row[f]);
                max = max.max(row[f]);
            }
            if max > min {
                Some((f, min, max))
            } else {
                None
            }
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(min..max);

    let (left_rows, right_rows): (Vec<_>, Vec<_>) =
        rows.iter().partition(|row| row[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left_rows, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(&right_rows, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64; FEATURE_COUNT], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] < *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n points,
/// the standard isolation-forest normalizer c(n).
fn average_path_length(n: usize) -> f64 {
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let nf = n as f64;
            2.0 * ((nf - 1.0).ln() + EULER_GAMMA) - 2.0 * (nf - 1.0) / nf
        }
    }
}
