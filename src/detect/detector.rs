//! Anomaly detector: trainable outlier scorer plus statistical classifier.

use crate::config::DetectorSettings;
use crate::detect::baseline::{compute_baselines, Baseline};
use crate::detect::forest::IsolationForest;
use crate::detect::scaler::StandardScaler;
use crate::detect::{AnomalyResult, AnomalySeverity, AnomalyType, DetectError};
use crate::metrics::{TrafficMetrics, FEATURE_COUNT, FEATURE_NAMES};
use crate::persist::{self, PersistError};
use crate::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Minimum samples required before training is meaningful.
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Summary returned by a successful training pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub samples: usize,
    pub contamination: f64,
    pub score_threshold: f64,
    pub baselines: BTreeMap<String, Baseline>,
    pub trained_at: DateTime<Utc>,
}

/// Model/state summary for introspection endpoints and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub is_trained: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub training_samples: usize,
    pub contamination: f64,
    pub n_estimators: usize,
    pub threshold_multiplier: f64,
    pub score_threshold: Option<f64>,
    pub feature_names: Vec<String>,
}

/// Feature-based outlier detection with statistical type attribution.
///
/// Owns its scaler, ensemble model, and baselines; train/replace is an
/// explicit call on an owned value, never ambient shared state. Callers
/// sharing an instance across threads must serialize access themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetector {
    contamination: f64,
    n_estimators: usize,
    random_state: u64,
    threshold_multiplier: f64,

    scaler: Option<StandardScaler>,
    forest: IsolationForest,
    baselines: BTreeMap<String, Baseline>,
    score_threshold: f64,

    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

impl AnomalyDetector {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            contamination: settings.contamination,
            n_estimators: settings.n_estimators,
            random_state: settings.random_state,
            threshold_multiplier: settings.threshold_multiplier,
            scaler: None,
            forest: IsolationForest::new(settings.n_estimators, settings.random_state),
            baselines: BTreeMap::new(),
            score_threshold: -0.5,
            trained_at: None,
            training_samples: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    pub fn score_threshold(&self) -> f64 {
        self.score_threshold
    }

    pub fn baselines(&self) -> &BTreeMap<String, Baseline> {
        &self.baselines
    }

    /// Train scaler, forest, and baselines on historical samples.
    ///
    /// NaN features are replaced with the per-feature median; rows with
    /// infinite values are dropped. Fails without touching prior trained
    /// state when fewer than [`MIN_TRAINING_SAMPLES`] rows survive.
    pub fn train(
        &mut self,
        samples: &[TrafficMetrics],
    ) -> Result<CalibrationSummary, DetectError> {
        let rows = sanitize_training_rows(samples);

        if rows.len() < MIN_TRAINING_SAMPLES {
            return Err(DetectError::InsufficientData {
                needed: MIN_TRAINING_SAMPLES,
                have: rows.len(),
            });
        }

        info!(samples = rows.len(), "Training anomaly detector");

        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform_all(&rows);

        let mut forest = IsolationForest::new(self.n_estimators, self.random_state);
        forest.fit(&scaled);

        // Calibrate the decision threshold so that roughly `contamination`
        // of the training distribution scores below it.
        let scores: Vec<f64> = scaled.iter().map(|r| forest.score(r)).collect();
        let threshold = stats::percentile(&scores, self.contamination * 100.0);

        let baselines = compute_baselines(&rows);

        // Commit only after everything computed; a failed pass above
        // leaves prior trained state intact.
        self.scaler = Some(scaler);
        self.forest = forest;
        self.baselines = baselines.clone();
        self.score_threshold = threshold;
        self.trained_at = Some(Utc::now());
        self.training_samples = rows.len();

        info!(threshold = %format!("{:.4}", threshold), "Training complete");

        Ok(CalibrationSummary {
            samples: rows.len(),
            contamination: self.contamination,
            score_threshold: threshold,
            baselines,
            trained_at: self.trained_at.unwrap_or_else(Utc::now),
        })
    }

    /// Score one sample and classify type, severity, and confidence.
    pub fn detect(&self, metrics: &TrafficMetrics) -> Result<AnomalyResult, DetectError> {
        let scaler = self.scaler.as_ref().ok_or(DetectError::NotTrained)?;

        let row = metrics.to_feature_vector();
        for (i, v) in row.iter().enumerate() {
            if !v.is_finite() {
                return Err(DetectError::NonFiniteFeature {
                    feature: FEATURE_NAMES[i].to_string(),
                });
            }
        }

        let scaled = scaler.transform(&row);
        let raw_score = self.forest.score(&scaled);
        let is_anomaly = raw_score < self.score_threshold;
        let normalized_score = normalize_score(raw_score);

        let (anomaly_type, type_z) = self.identify_type(metrics);
        let severity = is_anomaly.then(|| severity_for(normalized_score));
        let confidence = confidence_for(raw_score, type_z);
        let explanation = self.build_explanation(metrics, is_anomaly, anomaly_type);

        let features: BTreeMap<String, f64> = FEATURE_NAMES
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        Ok(AnomalyResult {
            is_anomaly,
            score: raw_score,
            normalized_score,
            anomaly_type: is_anomaly.then_some(anomaly_type),
            severity,
            confidence,
            features,
            explanation,
            timestamp: metrics.timestamp,
        })
    }

    /// Detect over a batch. Elements are independent; output preserves
    /// input order.
    pub fn detect_batch(
        &self,
        samples: &[TrafficMetrics],
    ) -> Result<Vec<AnomalyResult>, DetectError> {
        samples.iter().map(|m| self.detect(m)).collect()
    }

    /// Attribute the dominant anomaly type from per-feature z-scores.
    ///
    /// Returns the winning type and its z-score; a pattern anomaly with
    /// score 0.5 when no feature fires, multi-dimensional when more than
    /// two distinct types fire at once.
    fn identify_type(&self, metrics: &TrafficMetrics) -> (AnomalyType, f64) {
        let mut candidates: BTreeMap<&'static str, (AnomalyType, f64)> = BTreeMap::new();
        let mut put = |key: &'static str, ty: AnomalyType, z: f64| {
            candidates
                .entry(key)
                .and_modify(|(_, old)| *old = old.max(z))
                .or_insert((ty, z));
        };

        if let Some(b) = self.baselines.get("requests_per_second") {
            let z = b.z_score(metrics.requests_per_second);
            if z > self.threshold_multiplier {
                put("traffic_spike", AnomalyType::TrafficSpike, z);
            } else if z < -self.threshold_multiplier {
                put("traffic_drop", AnomalyType::TrafficDrop, z.abs());
            }
        }

        if let Some(b) = self.baselines.get("avg_latency_ms") {
            let z = b.z_score(metrics.avg_latency_ms);
            if z > self.threshold_multiplier {
                put("latency_spike", AnomalyType::LatencySpike, z);
            }
        }

        if let Some(b) = self.baselines.get("p95_latency_ms") {
            let z = b.z_score(metrics.p95_latency_ms);
            if z > self.threshold_multiplier {
                put("latency_spike", AnomalyType::LatencySpike, z);
            }
        }

        if let Some(b) = self.baselines.get("error_rate") {
            let z = b.z_score(metrics.error_rate);
            if z > self.threshold_multiplier {
                put("error_rate_spike", AnomalyType::ErrorRateSpike, z);
            }
        }

        if candidates.is_empty() {
            return (AnomalyType::PatternAnomaly, 0.5);
        }
        if candidates.len() > 2 {
            let max_z = candidates
                .values()
                .map(|(_, z)| *z)
                .fold(f64::NEG_INFINITY, f64::max);
            return (AnomalyType::MultiDimensional, max_z);
        }

        candidates
            .values()
            .cloned()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((AnomalyType::PatternAnomaly, 0.5))
    }

    fn build_explanation(
        &self,
        metrics: &TrafficMetrics,
        is_anomaly: bool,
        anomaly_type: AnomalyType,
    ) -> String {
        if !is_anomaly {
            return "Traffic patterns are within normal parameters.".to_string();
        }

        let baseline_mean =
            |name: &str| self.baselines.get(name).map(|b| b.mean).unwrap_or(0.0);

        match anomaly_type {
            AnomalyType::TrafficSpike => format!(
                "Detected traffic spike: {:.1} req/s (baseline: {:.1} req/s)",
                metrics.requests_per_second,
                baseline_mean("requests_per_second")
            ),
            AnomalyType::TrafficDrop => format!(
                "Detected unusual traffic drop: {:.1} req/s (baseline: {:.1} req/s)",
                metrics.requests_per_second,
                baseline_mean("requests_per_second")
            ),
            AnomalyType::LatencySpike => format!(
                "Detected latency spike: avg={:.1}ms, p95={:.1}ms (baseline avg: {:.1}ms)",
                metrics.avg_latency_ms,
                metrics.p95_latency_ms,
                baseline_mean("avg_latency_ms")
            ),
            AnomalyType::ErrorRateSpike => format!(
                "Detected elevated error rate: {:.2}% (baseline: {:.2}%)",
                metrics.error_rate * 100.0,
                baseline_mean("error_rate") * 100.0
            ),
            AnomalyType::PatternAnomaly => {
                "Detected unusual traffic pattern that doesn't match normal behavior".to_string()
            }
            AnomalyType::MultiDimensional => {
                "Detected anomalies across multiple metrics simultaneously".to_string()
            }
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            is_trained: self.is_trained(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
            contamination: self.contamination,
            n_estimators: self.n_estimators,
            threshold_multiplier: self.threshold_multiplier,
            score_threshold: self.is_trained().then_some(self.score_threshold),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Persist the full trained state (scaler, forest, baselines,
    /// threshold) so a loaded instance reproduces identical verdicts.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if !self.is_trained() {
            return Err(PersistError::Untrained);
        }
        persist::save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        persist::load_json(path)
    }
}

/// Replace NaN with the per-feature median, then drop rows carrying
/// infinite values.
fn sanitize_training_rows(samples: &[TrafficMetrics]) -> Vec<[f64; FEATURE_COUNT]> {
    let raw: Vec<[f64; FEATURE_COUNT]> =
        samples.iter().map(|m| m.to_feature_vector()).collect();

    let mut medians = [0.0; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        let finite: Vec<f64> = raw.iter().map(|r| r[i]).filter(|v| v.is_finite()).collect();
        medians[i] = stats::median(&finite);
    }

    raw.into_iter()
        .map(|mut row| {
            for i in 0..FEATURE_COUNT {
                if row[i].is_nan() {
                    row[i] = medians[i];
                }
            }
            row
        })
        .filter(|row| row.iter().all(|v| v.is_finite()))
        .collect()
}

/// Logistic transform of the raw score into [0, 1]; very negative raw
/// scores (easy to isolate) approach 1.
fn normalize_score(raw_score: f64) -> f64 {
    (1.0 / (1.0 + (raw_score * 5.0).exp())).clamp(0.0, 1.0)
}

fn severity_for(normalized_score: f64) -> AnomalySeverity {
    if normalized_score >= 0.9 {
        AnomalySeverity::Critical
    } else if normalized_score >= 0.75 {
        AnomalySeverity::High
    } else if normalized_score >= 0.6 {
        AnomalySeverity::Medium
    } else {
        AnomalySeverity::Low
    }
}

/// Blend the ensemble score with the type-attribution z-score.
fn confidence_for(raw_score: f64, type_z: f64) -> f64 {
    let model_confidence = 1.0 / (1.0 + (raw_score * 3.0).exp());
    let type_confidence = (type_z / 5.0).min(1.0);
    (0.7 * model_confidence + 0.3 * type_confidence).clamp(0.0, 1.0)
}
