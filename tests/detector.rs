//! End-to-end detector tests: train on synthetic normal traffic, score
//! known outliers, and verify persistence round-trips.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ratewarden::config::DetectorSettings;
use ratewarden::detect::detector::AnomalyDetector;
use ratewarden::detect::{AnomalyType, DetectError};
use ratewarden::metrics::TrafficMetrics;

fn metrics(rps: f64, avg_latency: f64, p95: f64, p99: f64, error_rate: f64) -> TrafficMetrics {
    TrafficMetrics {
        timestamp: Utc::now(),
        requests_per_second: rps,
        avg_latency_ms: avg_latency,
        p95_latency_ms: p95,
        p99_latency_ms: p99,
        error_rate,
    }
}

/// Box-Muller gaussian from a seeded rng.
fn gaussian(rng: &mut StdRng, mean: f64, std: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std * z
}

fn normal_traffic(n: usize) -> Vec<TrafficMetrics> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            metrics(
                gaussian(&mut rng, 50.0, 10.0).max(1.0),
                gaussian(&mut rng, 30.0, 5.0).max(1.0),
                gaussian(&mut rng, 60.0, 8.0).max(1.0),
                gaussian(&mut rng, 90.0, 10.0).max(1.0),
                gaussian(&mut rng, 0.02, 0.005).clamp(0.0, 1.0),
            )
        })
        .collect()
}

fn trained_detector() -> AnomalyDetector {
    let mut detector = AnomalyDetector::new(&DetectorSettings::default());
    detector.train(&normal_traffic(500)).unwrap();
    detector
}

#[test]
fn test_traffic_spike_is_flagged() {
    let detector = trained_detector();
    let result = detector
        .detect(&metrics(500.0, 30.0, 60.0, 90.0, 0.02))
        .unwrap();

    assert!(result.is_anomaly);
    assert_eq!(result.anomaly_type, Some(AnomalyType::TrafficSpike));
    assert!(result.severity.is_some());
    assert!(result.score < detector.score_threshold());
}

#[test]
fn test_normal_sample_passes() {
    let detector = trained_detector();
    let result = detector
        .detect(&metrics(50.0, 30.0, 60.0, 90.0, 0.02))
        .unwrap();

    assert!(!result.is_anomaly);
    assert!(result.anomaly_type.is_none());
    assert!(result.severity.is_none());
}

#[test]
fn test_normalized_score_bounds() {
    let detector = trained_detector();
    for sample in [
        metrics(50.0, 30.0, 60.0, 90.0, 0.02),
        metrics(5000.0, 2000.0, 4000.0, 8000.0, 0.9),
        metrics(0.1, 1.0, 2.0, 3.0, 0.0),
    ] {
        let result = detector.detect(&sample).unwrap();
        assert!((0.0..=1.0).contains(&result.normalized_score));
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}

#[test]
fn test_flag_consistent_with_threshold() {
    let detector = trained_detector();
    let threshold = detector.score_threshold();
    for sample in normal_traffic(50) {
        let result = detector.detect(&sample).unwrap();
        assert_eq!(result.is_anomaly, result.score < threshold);
    }
}

#[test]
fn test_untrained_detector_refuses_detection() {
    let detector = AnomalyDetector::new(&DetectorSettings::default());
    let err = detector
        .detect(&metrics(50.0, 30.0, 60.0, 90.0, 0.02))
        .unwrap_err();
    assert!(matches!(err, DetectError::NotTrained));
}

#[test]
fn test_training_requires_enough_samples() {
    let mut detector = AnomalyDetector::new(&DetectorSettings::default());
    let err = detector.train(&normal_traffic(5)).unwrap_err();
    assert!(matches!(err, DetectError::InsufficientData { .. }));
    assert!(!detector.is_trained());
}

#[test]
fn test_batch_preserves_order() {
    let detector = trained_detector();
    let samples = vec![
        metrics(50.0, 30.0, 60.0, 90.0, 0.02),
        metrics(500.0, 30.0, 60.0, 90.0, 0.02),
        metrics(51.0, 31.0, 61.0, 91.0, 0.02),
    ];
    let results = detector.detect_batch(&samples).unwrap();
    assert_eq!(results.len(), 3);
    assert!(!results[0].is_anomaly);
    assert!(results[1].is_anomaly);
    assert!(!results[2].is_anomaly);
}

#[test]
fn test_save_load_reproduces_verdicts() {
    let detector = trained_detector();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    detector.save(&path).unwrap();

    let restored = AnomalyDetector::load(&path).unwrap();
    assert_eq!(restored.score_threshold(), detector.score_threshold());

    for sample in normal_traffic(30)
        .into_iter()
        .chain([metrics(500.0, 30.0, 60.0, 90.0, 0.02)])
    {
        let a = detector.detect(&sample).unwrap();
        let b = restored.detect(&sample).unwrap();
        assert_eq!(a.is_anomaly, b.is_anomaly);
        assert_eq!(a.score, b.score);
        assert_eq!(a.anomaly_type, b.anomaly_type);
    }
}

#[test]
fn test_save_untrained_fails() {
    let detector = AnomalyDetector::new(&DetectorSettings::default());
    let dir = tempfile::tempdir().unwrap();
    assert!(detector.save(&dir.path().join("model.json")).is_err());
}

#[test]
fn test_error_rate_spike_attribution() {
    let detector = trained_detector();
    let result = detector
        .detect(&metrics(50.0, 30.0, 60.0, 90.0, 0.5))
        .unwrap();
    assert!(result.is_anomaly);
    assert_eq!(result.anomaly_type, Some(AnomalyType::ErrorRateSpike));
}
