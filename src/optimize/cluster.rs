//! Endpoint clustering by traffic shape.
//!
//! Seeded k-means over scaled profile features. Clusters are recomputed
//! from scratch on every call; nothing is cached between calls.

use crate::optimize::profile::EndpointProfile;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::debug;

const FEATURES: usize = 5;
const MAX_ITERATIONS: usize = 100;
const SEED: u64 = 42;

/// Group endpoints into up to `n_clusters` buckets of similar traffic
/// shape, keyed by a descriptive name derived from each cluster's
/// centroid. Empty clusters are dropped; `n_clusters` is clamped to the
/// endpoint count.
pub fn cluster_endpoints(
    profiles: &BTreeMap<String, EndpointProfile>,
    n_clusters: usize,
) -> BTreeMap<String, Vec<String>> {
    if profiles.is_empty() || n_clusters == 0 {
        return BTreeMap::new();
    }

    let endpoints: Vec<&String> = profiles.keys().collect();
    let raw: Vec<[f64; FEATURES]> = endpoints
        .iter()
        .map(|e| feature_row(&profiles[*e]))
        .collect();
    let scaled = scale_columns(&raw);

    let k = n_clusters.min(endpoints.len());
    let assignments = kmeans(&scaled, k);

    // Centroid features in original units for naming
    let mut raw_centroids = vec![[0.0; FEATURES]; k];
    let mut sizes = vec![0usize; k];
    for (row, &cluster) in raw.iter().zip(&assignments) {
        for (acc, v) in raw_centroids[cluster].iter_mut().zip(row) {
            *acc += v;
        }
        sizes[cluster] += 1;
    }
    for (centroid, &size) in raw_centroids.iter_mut().zip(&sizes) {
        if size > 0 {
            for v in centroid.iter_mut() {
                *v /= size as f64;
            }
        }
    }
    debug!(k, endpoints = endpoints.len(), "k-means converged");

    let mut named: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut name_counts: BTreeMap<String, usize> = BTreeMap::new();
    for cluster in 0..k {
        if sizes[cluster] == 0 {
            continue;
        }
        let base = cluster_name(&raw_centroids[cluster]);
        let count = name_counts.entry(base.clone()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            base
        } else {
            format!("{}_{}", base, count)
        };

        let members: Vec<String> = endpoints
            .iter()
            .zip(&assignments)
            .filter(|(_, &c)| c == cluster)
            .map(|(e, _)| (*e).clone())
            .collect();
        named.insert(name, members);
    }
    named
}

fn feature_row(profile: &EndpointProfile) -> [f64; FEATURES] {
    [
        profile.avg_requests_per_minute,
        profile.peak_requests_per_minute,
        profile.avg_latency_ms,
        profile.error_rate,
        profile.time_of_day_variance,
    ]
}

/// Column-wise standardization; constant columns collapse to zero.
fn scale_columns(rows: &[[f64; FEATURES]]) -> Vec<[f64; FEATURES]> {
    let n = rows.len() as f64;
    let mut means = [0.0; FEATURES];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mut stds = [0.0; FEATURES];
    for row in rows {
        for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
            *s += (v - m).powi(2) / n;
        }
    }
    for s in stds.iter_mut() {
        *s = s.sqrt();
    }

    rows.iter()
        .map(|row| {
            let mut scaled = [0.0; FEATURES];
            for i in 0..FEATURES {
                scaled[i] = if stds[i] > 0.0 {
                    (row[i] - means[i]) / stds[i]
                } else {
                    0.0
                };
            }
            scaled
        })
        .collect()
}

/// Lloyd's algorithm with seeded random initialization. Deterministic
/// for a given input.
fn kmeans(rows: &[[f64; FEATURES]], k: usize) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut indices: Vec<usize> = (0..rows.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<[f64; FEATURES]> =
        indices.iter().take(k).map(|&i| rows[i]).collect();

    let mut assignments = vec![0usize; rows.len()];
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| (c, squared_distance(row, centroid)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c)
                .unwrap_or(0);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0; FEATURES]; k];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in rows.iter().zip(&assignments) {
            for (acc, v) in sums[cluster].iter_mut().zip(row) {
                *acc += v;
            }
            counts[cluster] += 1;
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid
            if counts[c] > 0 {
                for (centroid, sum) in centroids[c].iter_mut().zip(&sums[c]) {
                    *centroid = sum / counts[c] as f64;
                }
            }
        }
    }

    assignments
}

fn squared_distance(a: &[f64; FEATURES], b: &[f64; FEATURES]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Descriptive label from centroid traffic volume and latency.
fn cluster_name(centroid: &[f64; FEATURES]) -> String {
    let avg_rpm = centroid[0];
    let avg_latency = centroid[2];

    if avg_rpm > 100.0 && avg_latency > 200.0 {
        "high_traffic_slow"
    } else if avg_rpm > 100.0 {
        "high_traffic_fast"
    } else if avg_rpm > 10.0 {
        "medium_traffic"
    } else if avg_latency > 500.0 {
        "low_traffic_slow"
    } else {
        "low_traffic"
    }
    .to_string()
}
