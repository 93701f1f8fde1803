//! End-to-end optimizer tests: profile synthetic request logs, check
//! recommendation ordering properties, clustering, and persistence.

use chrono::{Duration, TimeZone, Utc};
use ratewarden::config::OptimizerSettings;
use ratewarden::metrics::RequestRecord;
use ratewarden::optimize::engine::RateLimitOptimizer;
use ratewarden::optimize::{Strategy, Tier};

fn record(endpoint: &str, offset_secs: i64, latency: f64, status: u16) -> RequestRecord {
    let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    RequestRecord {
        timestamp: base + Duration::seconds(offset_secs),
        endpoint: endpoint.to_string(),
        method: Some("GET".to_string()),
        response_time_ms: latency,
        status_code: status,
        user_id: Some(format!("user-{}", offset_secs % 17)),
        ip_address: None,
    }
}

/// Steady traffic at roughly `per_minute` requests over an hour.
fn steady_traffic(endpoint: &str, per_minute: i64) -> Vec<RequestRecord> {
    let mut records = Vec::new();
    for minute in 0..60 {
        for i in 0..per_minute {
            let offset = minute * 60 + (i * 60 / per_minute.max(1));
            records.push(record(endpoint, offset, 40.0, 200));
        }
    }
    records
}

fn analyzed_optimizer(records: &[RequestRecord]) -> RateLimitOptimizer {
    let mut optimizer = RateLimitOptimizer::new(&OptimizerSettings::default());
    optimizer.analyze_traffic(records);
    optimizer
}

#[test]
fn test_profiles_capture_traffic_rate() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 30));
    let profile = &optimizer.profiles()["/api/users"];

    assert!((profile.avg_requests_per_minute - 30.0).abs() < 1.0);
    assert_eq!(profile.total_requests, 30 * 60);
    assert_eq!(profile.error_rate, 0.0);
}

#[test]
fn test_recommended_limit_exceeds_observed_traffic() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 100));
    let rec = optimizer.recommend("/api/users", Tier::Default, None, Some(Strategy::Balanced));

    // p95 plus headroom must leave room above the steady rate
    assert!(rec.recommended_limit as f64 >= 100.0);
    assert!(rec.recommended_burst <= rec.recommended_limit.max(10));
}

#[test]
fn test_strategy_ordering() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 100));
    let limit = |s| {
        optimizer
            .recommend("/api/users", Tier::Default, None, Some(s))
            .recommended_limit
    };
    assert!(limit(Strategy::Conservative) <= limit(Strategy::Balanced));
    assert!(limit(Strategy::Balanced) <= limit(Strategy::Permissive));
}

#[test]
fn test_tier_ordering() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 100));
    let limit = |t| {
        optimizer
            .recommend("/api/users", t, None, Some(Strategy::Balanced))
            .recommended_limit
    };
    assert!(limit(Tier::Free) <= limit(Tier::Basic));
    assert!(limit(Tier::Basic) <= limit(Tier::Default));
    assert!(limit(Tier::Default) <= limit(Tier::Standard));
    assert!(limit(Tier::Standard) <= limit(Tier::Premium));
    assert!(limit(Tier::Premium) <= limit(Tier::Enterprise));
}

#[test]
fn test_recommend_all_covers_every_endpoint() {
    let mut records = steady_traffic("/api/users", 20);
    records.extend(steady_traffic("/api/orders", 5));
    records.extend(steady_traffic("/api/search", 80));

    let optimizer = analyzed_optimizer(&records);
    let recs = optimizer.recommend_all(Tier::Default, None).unwrap();

    let mut endpoints: Vec<&str> = recs.iter().map(|r| r.endpoint.as_str()).collect();
    endpoints.sort();
    assert_eq!(endpoints, vec!["/api/orders", "/api/search", "/api/users"]);
}

#[test]
fn test_error_heavy_endpoint_warns() {
    let mut records = Vec::new();
    for minute in 0..60 {
        for i in 0..10 {
            let status = if i < 3 { 503 } else { 200 };
            records.push(record("/api/flaky", minute * 60 + i * 6, 40.0, status));
        }
    }
    let optimizer = analyzed_optimizer(&records);
    let rec = optimizer.recommend("/api/flaky", Tier::Default, None, None);

    assert!(rec.warnings.iter().any(|w| w.contains("High error rate")));
    assert!(rec.reasoning.contains("backend issues"));
}

#[test]
fn test_adaptive_tightens_flaky_endpoints() {
    let mut records = steady_traffic("/api/healthy", 50);
    for minute in 0..60 {
        for i in 0..50 {
            let status = if i < 15 { 500 } else { 200 };
            records.push(record("/api/flaky", minute * 60 + i, 40.0, status));
        }
    }
    let optimizer = analyzed_optimizer(&records);

    let healthy = optimizer.recommend("/api/healthy", Tier::Default, None, Some(Strategy::Adaptive));
    let flaky = optimizer.recommend("/api/flaky", Tier::Default, None, Some(Strategy::Adaptive));
    assert!(flaky.recommended_limit <= healthy.recommended_limit);
}

#[test]
fn test_unknown_endpoint_uses_tier_defaults() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 10));
    let rec = optimizer.recommend("/api/ghost", Tier::Basic, None, Some(Strategy::Balanced));

    assert_eq!(rec.recommended_limit, 100);
    assert_eq!(rec.confidence, 0.3);
    assert!(rec.profile.is_none());
}

#[test]
fn test_cluster_partition() {
    let mut records = steady_traffic("/hot/a", 200);
    records.extend(steady_traffic("/hot/b", 190));
    records.extend(steady_traffic("/cold/a", 1));
    records.extend(steady_traffic("/cold/b", 2));
    records.extend(steady_traffic("/mid/a", 40));

    let optimizer = analyzed_optimizer(&records);
    let clusters = optimizer.cluster_endpoints(3);

    let mut members: Vec<String> = clusters.values().flatten().cloned().collect();
    members.sort();
    assert_eq!(
        members,
        vec!["/cold/a", "/cold/b", "/hot/a", "/hot/b", "/mid/a"]
    );
}

#[test]
fn test_save_load_reproduces_recommendations() {
    let optimizer = analyzed_optimizer(&steady_traffic("/api/users", 60));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("optimizer.json");
    optimizer.save(&path).unwrap();

    let restored = RateLimitOptimizer::load(&path).unwrap();
    let before = optimizer.recommend("/api/users", Tier::Premium, Some(500), None);
    let after = restored.recommend("/api/users", Tier::Premium, Some(500), None);

    assert_eq!(before.recommended_limit, after.recommended_limit);
    assert_eq!(before.recommended_burst, after.recommended_burst);
    assert_eq!(before.reasoning, after.reasoning);
}

#[test]
fn test_save_before_analysis_fails() {
    let optimizer = RateLimitOptimizer::new(&OptimizerSettings::default());
    let dir = tempfile::tempdir().unwrap();
    assert!(optimizer.save(&dir.path().join("optimizer.json")).is_err());
}
