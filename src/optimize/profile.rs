//! Endpoint traffic profiling from raw request records.

use crate::metrics::RequestRecord;
use crate::stats::{self, safe_f64};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Aggregate traffic shape for one endpoint path.
///
/// A snapshot: one profiling pass produces it whole and the next pass
/// replaces it. Records are grouped by endpoint path only; the method is
/// tracked as the modal method but does not split profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointProfile {
    pub endpoint: String,
    pub method: String,
    pub avg_requests_per_minute: f64,
    pub peak_requests_per_minute: f64,
    pub p95_requests_per_minute: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub unique_users: u64,
    pub total_requests: u64,
    pub typical_burst_size: u32,
    /// Hourly-count std over hourly-count mean; 0 when undefined.
    pub time_of_day_variance: f64,
}

/// Build per-endpoint profiles from a batch of request records.
pub fn analyze_traffic(records: &[RequestRecord]) -> BTreeMap<String, EndpointProfile> {
    info!(records = records.len(), "Analyzing traffic records");

    let mut grouped: BTreeMap<String, Vec<&RequestRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.endpoint.clone()).or_default().push(record);
    }

    let profiles: BTreeMap<String, EndpointProfile> = grouped
        .into_iter()
        .map(|(endpoint, group)| {
            let profile = build_profile(&endpoint, &group);
            (endpoint, profile)
        })
        .collect();

    info!(endpoints = profiles.len(), "Built endpoint profiles");
    profiles
}

fn build_profile(endpoint: &str, records: &[&RequestRecord]) -> EndpointProfile {
    let minute_counts = bucket_counts(records, 60);
    let hourly_counts = bucket_counts(records, 3600);

    let avg_rpm = safe_f64(stats::mean(&minute_counts), 0.0);
    let peak_rpm = safe_f64(
        minute_counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        0.0,
    );
    let p95_rpm = safe_f64(stats::percentile(&minute_counts, 95.0), 0.0);

    let hourly_mean = stats::mean(&hourly_counts);
    let hourly_std = stats::sample_std_dev(&hourly_counts);
    let variance = if hourly_mean > 0.0 {
        safe_f64(hourly_std / hourly_mean, 0.0)
    } else {
        0.0
    };

    // Rough 1-second burst estimate from peak throughput. Placeholder
    // policy, not empirically calibrated.
    let typical_burst = (((peak_rpm / 60.0) * 3.0) as u32).max(1);

    let latencies: Vec<f64> = records.iter().map(|r| r.response_time_ms).collect();
    let avg_latency = safe_f64(stats::mean(&latencies), 0.0);

    let errors = records.iter().filter(|r| r.status_code >= 400).count();
    let error_rate = if records.is_empty() {
        0.0
    } else {
        safe_f64(errors as f64 / records.len() as f64, 0.0)
    };

    EndpointProfile {
        endpoint: endpoint.to_string(),
        method: modal_method(records),
        avg_requests_per_minute: avg_rpm,
        peak_requests_per_minute: peak_rpm,
        p95_requests_per_minute: p95_rpm,
        avg_latency_ms: avg_latency,
        error_rate,
        unique_users: count_unique_users(records),
        total_requests: records.len() as u64,
        typical_burst_size: typical_burst,
        time_of_day_variance: variance,
    }
}

/// Count requests per fixed time bucket, zero-filling gaps between the
/// first and last record so quiet periods weigh into the averages.
fn bucket_counts(records: &[&RequestRecord], bucket_secs: i64) -> Vec<f64> {
    if records.is_empty() {
        return Vec::new();
    }

    let buckets: Vec<i64> = records
        .iter()
        .map(|r| r.timestamp.timestamp().div_euclid(bucket_secs))
        .collect();
    let first = *buckets.iter().min().unwrap_or(&0);
    let last = *buckets.iter().max().unwrap_or(&0);

    let mut counts = vec![0.0; (last - first + 1) as usize];
    for b in buckets {
        counts[(b - first) as usize] += 1.0;
    }
    counts
}

/// Most frequent HTTP method; lexicographic tie-break, "ALL" when
/// records carry no method at all.
fn modal_method(records: &[&RequestRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        if let Some(method) = &record.method {
            *counts.entry(method.as_str()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(a_name, a_count), (b_name, b_count)| {
            a_count.cmp(b_count).then(b_name.cmp(a_name))
        })
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| "ALL".to_string())
}

/// Distinct user ids, falling back to client IPs when no record carries
/// a user id.
fn count_unique_users(records: &[&RequestRecord]) -> u64 {
    let users: HashSet<&str> = records
        .iter()
        .filter_map(|r| r.user_id.as_deref())
        .collect();
    if !users.is_empty() {
        return users.len() as u64;
    }
    let ips: HashSet<&str> = records
        .iter()
        .filter_map(|r| r.ip_address.as_deref())
        .collect();
    ips.len() as u64
}
