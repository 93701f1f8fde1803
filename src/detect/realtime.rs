//! Real-time layer: sliding window, persistence streaks, trend direction.

use crate::detect::detector::AnomalyDetector;
use crate::detect::{AnomalyResult, DetectError};
use crate::metrics::TrafficMetrics;
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Direction of a metric series over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Trend report over the sliding window. Only available once at least
/// two samples are present.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub window_size: usize,
    pub anomaly_streak: usize,
    pub rps_trend: Trend,
    pub latency_trend: Trend,
    pub error_trend: Trend,
    /// Fraction of results in the history flagged anomalous.
    pub recent_anomaly_rate: f64,
}

/// Stateful wrapper over [`AnomalyDetector`] that tracks anomaly
/// persistence across consecutive samples.
///
/// Not safe for concurrent `process` calls; keep one per session or
/// synchronize externally.
pub struct RealTimeDetector {
    detector: AnomalyDetector,
    window_size: usize,
    persistence_threshold: usize,

    window: VecDeque<TrafficMetrics>,
    history: VecDeque<AnomalyResult>,
    anomaly_streak: usize,
}

impl RealTimeDetector {
    pub fn new(detector: AnomalyDetector, window_size: usize, persistence_threshold: usize) -> Self {
        Self {
            detector,
            window_size: window_size.max(1),
            persistence_threshold: persistence_threshold.max(1),
            window: VecDeque::new(),
            history: VecDeque::new(),
            anomaly_streak: 0,
        }
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn anomaly_streak(&self) -> usize {
        self.anomaly_streak
    }

    /// Process one sample: window it, detect, and track persistence.
    ///
    /// Once the streak reaches the persistence threshold the returned
    /// result is a new annotated value with boosted confidence and a
    /// confirmation note; the unannotated base verdict stays in the
    /// history as the auditable record.
    pub fn process(&mut self, metrics: TrafficMetrics) -> Result<AnomalyResult, DetectError> {
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(metrics.clone());

        let result = self.detector.detect(&metrics)?;

        if result.is_anomaly {
            self.anomaly_streak += 1;
        } else {
            self.anomaly_streak = 0;
        }

        if self.history.len() >= self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(result.clone());

        if self.anomaly_streak >= self.persistence_threshold {
            debug!(streak = self.anomaly_streak, "Anomaly confirmed by persistence");
            return Ok(confirm(&result, self.anomaly_streak));
        }

        Ok(result)
    }

    /// Trend analysis over the window. `None` until two samples exist.
    pub fn trend(&self) -> Option<TrendSummary> {
        if self.window.len() < 2 {
            return None;
        }

        let rps: Vec<f64> = self.window.iter().map(|m| m.requests_per_second).collect();
        let latency: Vec<f64> = self.window.iter().map(|m| m.avg_latency_ms).collect();
        let errors: Vec<f64> = self.window.iter().map(|m| m.error_rate).collect();

        let anomaly_rate = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().filter(|r| r.is_anomaly).count() as f64
                / self.history.len() as f64
        };

        Some(TrendSummary {
            window_size: self.window.len(),
            anomaly_streak: self.anomaly_streak,
            rps_trend: classify_trend(&rps),
            latency_trend: classify_trend(&latency),
            error_trend: classify_trend(&errors),
            recent_anomaly_rate: anomaly_rate,
        })
    }

    /// Clear window, history, and streak.
    pub fn reset(&mut self) {
        self.window.clear();
        self.history.clear();
        self.anomaly_streak = 0;
    }
}

/// Build the confirmed variant of a result: confidence boosted by 20%
/// (capped at 1.0), explanation prefixed with the persistence note.
fn confirm(base: &AnomalyResult, streak: usize) -> AnomalyResult {
    let mut confirmed = base.clone();
    confirmed.confidence = (base.confidence * 1.2).min(1.0);
    confirmed.explanation = format!(
        "CONFIRMED: {} (persisted for {} intervals)",
        base.explanation, streak
    );
    confirmed
}

/// Slope normalized by the series std; ±0.5 cutoffs. A flat series
/// (zero std) is stable by definition.
fn classify_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }
    let std = stats::std_dev(values);
    if std == 0.0 {
        return Trend::Stable;
    }
    let normalized_slope = stats::regression_slope(values) / std;
    if normalized_slope > 0.5 {
        Trend::Increasing
    } else if normalized_slope < -0.5 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorSettings;
    use chrono::Utc;

    fn sample(rps: f64) -> TrafficMetrics {
        TrafficMetrics {
            timestamp: Utc::now(),
            requests_per_second: rps,
            avg_latency_ms: 30.0,
            p95_latency_ms: 60.0,
            p99_latency_ms: 90.0,
            error_rate: 0.02,
        }
    }

    fn trained_detector() -> AnomalyDetector {
        let samples: Vec<TrafficMetrics> =
            (0..200).map(|i| sample(45.0 + (i % 10) as f64)).collect();
        let mut detector = AnomalyDetector::new(&DetectorSettings::default());
        detector.train(&samples).unwrap();
        detector
    }

    #[test]
    fn test_window_stays_bounded() {
        let mut rt = RealTimeDetector::new(trained_detector(), 5, 3);
        for _ in 0..12 {
            rt.process(sample(50.0)).unwrap();
        }
        assert_eq!(rt.window_len(), 5);
    }

    #[test]
    fn test_streak_resets_on_normal_sample() {
        let mut rt = RealTimeDetector::new(trained_detector(), 10, 3);
        rt.process(sample(5000.0)).unwrap();
        rt.process(sample(5000.0)).unwrap();
        assert_eq!(rt.anomaly_streak(), 2);
        rt.process(sample(50.0)).unwrap();
        assert_eq!(rt.anomaly_streak(), 0);
    }

    #[test]
    fn test_persistence_confirmation_annotates_new_result() {
        let mut rt = RealTimeDetector::new(trained_detector(), 10, 3);

        let mut last = rt.process(sample(5000.0)).unwrap();
        let unconfirmed_confidence = last.confidence;
        assert!(!last.explanation.contains("CONFIRMED"));

        for _ in 0..2 {
            last = rt.process(sample(5000.0)).unwrap();
        }
        assert!(last.is_anomaly);
        assert!(last.explanation.contains("CONFIRMED"));
        assert!(last.explanation.contains("persisted for 3 intervals"));
        assert!(last.confidence >= unconfirmed_confidence);
        assert!(last.confidence <= 1.0);

        // The audit history keeps the unannotated base verdict
        let stored = rt.history.back().unwrap();
        assert!(!stored.explanation.contains("CONFIRMED"));
    }

    #[test]
    fn test_trend_requires_two_samples() {
        let mut rt = RealTimeDetector::new(trained_detector(), 10, 3);
        assert!(rt.trend().is_none());
        rt.process(sample(50.0)).unwrap();
        assert!(rt.trend().is_none());
        rt.process(sample(51.0)).unwrap();
        assert!(rt.trend().is_some());
    }

    #[test]
    fn test_trend_directions() {
        // Short steep ramp: slope of 5 against a std of ~5.6 clears the
        // 0.5 normalized cutoff; a long shallow ramp would not.
        let mut rt = RealTimeDetector::new(trained_detector(), 30, 30);
        for rps in [40.0, 45.0, 50.0, 55.0] {
            rt.process(sample(rps)).unwrap();
        }
        let trend = rt.trend().unwrap();
        assert_eq!(trend.rps_trend, Trend::Increasing);
        assert_eq!(trend.latency_trend, Trend::Stable);

        rt.reset();
        for rps in [55.0, 50.0, 45.0, 40.0] {
            rt.process(sample(rps)).unwrap();
        }
        assert_eq!(rt.trend().unwrap().rps_trend, Trend::Decreasing);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut rt = RealTimeDetector::new(trained_detector(), 10, 3);
        for _ in 0..4 {
            rt.process(sample(5000.0)).unwrap();
        }
        rt.reset();
        assert_eq!(rt.window_len(), 0);
        assert_eq!(rt.anomaly_streak(), 0);
        assert!(rt.trend().is_none());
    }
}
