//! Anomaly detection: outlier scoring, classification, real-time tracking.

pub mod baseline;
pub mod detector;
pub mod forest;
pub mod realtime;
pub mod scaler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("insufficient training data: need {needed} samples, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("model is not trained; call train() first")]
    NotTrained,

    #[error("invalid feature input: {0}")]
    InvalidFeature(#[from] crate::metrics::MetricsError),

    #[error("non-finite value for feature '{feature}'")]
    NonFiniteFeature { feature: String },
}

/// Shapes of traffic anomaly the classifier can attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    TrafficSpike,
    TrafficDrop,
    LatencySpike,
    ErrorRateSpike,
    PatternAnomaly,
    MultiDimensional,
}

/// Severity ladder for flagged anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Verdict for a single metrics sample. Built once per detection call;
/// the real-time tracker derives annotated copies instead of mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    /// Raw ensemble score. Lower / more negative = easier to isolate.
    pub score: f64,
    /// Score mapped to [0, 1], higher = more anomalous.
    pub normalized_score: f64,
    pub anomaly_type: Option<AnomalyType>,
    pub severity: Option<AnomalySeverity>,
    pub confidence: f64,
    /// Snapshot of the feature values the verdict was computed from.
    pub features: BTreeMap<String, f64>,
    pub explanation: String,
    pub timestamp: DateTime<Utc>,
}
