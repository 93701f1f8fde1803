//! Input data types: per-minute traffic metrics and raw request records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Feature order for the anomaly model. Fixed: training and inference
/// must agree on it, index for index.
pub const FEATURE_NAMES: [&str; 5] = [
    "requests_per_second",
    "avg_latency_ms",
    "p95_latency_ms",
    "p99_latency_ms",
    "error_rate",
];

/// Number of features in a [`TrafficMetrics`] feature vector.
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics payload: expected a JSON object")]
    NotAnObject,
    #[error("invalid value for metric '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

/// One time-bucketed traffic sample, the unit of anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficMetrics {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub requests_per_second: f64,
    #[serde(default, alias = "avg_latency")]
    pub avg_latency_ms: f64,
    #[serde(default, alias = "p95_latency")]
    pub p95_latency_ms: f64,
    #[serde(default, alias = "p99_latency")]
    pub p99_latency_ms: f64,
    #[serde(default)]
    pub error_rate: f64,
}

impl TrafficMetrics {
    /// Convert to the fixed-order feature vector consumed by the model.
    pub fn to_feature_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.requests_per_second,
            self.avg_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.error_rate,
        ]
    }

    /// Build from a loosely-keyed JSON object. Missing metrics default to
    /// 0; present-but-non-numeric values are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MetricsError> {
        let obj = value.as_object().ok_or(MetricsError::NotAnObject)?;

        let field = |names: &[&str]| -> Result<f64, MetricsError> {
            for name in names {
                if let Some(v) = obj.get(*name) {
                    return parse_number(name, v);
                }
            }
            Ok(0.0)
        };

        let timestamp = match obj.get("timestamp").and_then(|v| v.as_str()) {
            Some(s) => s
                .parse::<DateTime<Utc>>()
                .map_err(|_| MetricsError::InvalidValue {
                    field: "timestamp".to_string(),
                    value: s.to_string(),
                })?,
            None => Utc::now(),
        };

        Ok(Self {
            timestamp,
            requests_per_second: field(&["requests_per_second"])?,
            avg_latency_ms: field(&["avg_latency_ms", "avg_latency"])?,
            p95_latency_ms: field(&["p95_latency_ms", "p95_latency"])?,
            p99_latency_ms: field(&["p99_latency_ms", "p99_latency"])?,
            error_rate: field(&["error_rate"])?,
        })
    }

    /// True when every feature is a normal finite number.
    pub fn is_finite(&self) -> bool {
        self.to_feature_vector().iter().all(|v| v.is_finite())
    }
}

fn parse_number(field: &str, value: &serde_json::Value) -> Result<f64, MetricsError> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| MetricsError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
        serde_json::Value::String(s) => {
            s.parse::<f64>().map_err(|_| MetricsError::InvalidValue {
                field: field.to_string(),
                value: s.clone(),
            })
        }
        _ => Err(MetricsError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// One raw API request row, the unit of traffic profiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "path")]
    pub endpoint: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "latency", alias = "response_time")]
    pub response_time_ms: f64,
    pub status_code: u16,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}
