//! Rate-limit recommendation engine.

use crate::config::OptimizerSettings;
use crate::metrics::RequestRecord;
use crate::optimize::cluster;
use crate::optimize::profile::{self, EndpointProfile};
use crate::optimize::{
    default_tier_configs, OptimizeError, RateLimitRecommendation, Strategy, Tier,
    TierConfiguration,
};
use crate::persist::{self, PersistError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Optimizer summary for introspection and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerInfo {
    pub is_trained: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub strategy: Strategy,
    pub headroom_percent: f64,
    pub endpoint_count: usize,
    pub endpoints: Vec<String>,
}

/// Converts endpoint traffic profiles into tier/strategy-adjusted rate
/// limits. Owns its profiles; a fresh analysis pass replaces them all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOptimizer {
    strategy: Strategy,
    headroom_percent: f64,
    tier_configs: BTreeMap<Tier, TierConfiguration>,
    profiles: BTreeMap<String, EndpointProfile>,
    trained_at: Option<DateTime<Utc>>,
}

impl RateLimitOptimizer {
    pub fn new(settings: &OptimizerSettings) -> Self {
        Self::with_tier_configs(settings, default_tier_configs())
    }

    /// Construct with a custom tier table (e.g. contractual overrides).
    pub fn with_tier_configs(
        settings: &OptimizerSettings,
        tier_configs: BTreeMap<Tier, TierConfiguration>,
    ) -> Self {
        Self {
            strategy: settings.strategy,
            headroom_percent: settings.headroom_percent,
            tier_configs,
            profiles: BTreeMap::new(),
            trained_at: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    pub fn profiles(&self) -> &BTreeMap<String, EndpointProfile> {
        &self.profiles
    }

    /// Profile a batch of raw request records, replacing any prior
    /// profiles wholesale (no incremental merge).
    pub fn analyze_traffic(
        &mut self,
        records: &[RequestRecord],
    ) -> &BTreeMap<String, EndpointProfile> {
        self.profiles = profile::analyze_traffic(records);
        self.trained_at = Some(Utc::now());
        &self.profiles
    }

    /// Recommend a limit and burst for one endpoint. Falls back to the
    /// static tier table when the endpoint has no profile.
    pub fn recommend(
        &self,
        endpoint: &str,
        tier: Tier,
        current_limit: Option<u32>,
        strategy: Option<Strategy>,
    ) -> RateLimitRecommendation {
        let strategy = strategy.unwrap_or(self.strategy);

        let Some(profile) = self.profiles.get(endpoint) else {
            return self.default_recommendation(endpoint, tier, current_limit, strategy);
        };

        let base_limit = self.base_limit(profile);

        let strategy_multiplier = match strategy {
            Strategy::Adaptive => adaptive_multiplier(profile),
            fixed => fixed.multiplier(),
        };

        let recommended_limit =
            (base_limit as f64 * tier.multiplier() * strategy_multiplier).round() as u32;
        let recommended_burst = burst_size(profile, recommended_limit);

        RateLimitRecommendation {
            endpoint: endpoint.to_string(),
            tier,
            current_limit,
            recommended_limit,
            recommended_burst,
            confidence: recommendation_confidence(profile),
            reasoning: self.build_reasoning(profile, strategy),
            strategy,
            warnings: build_warnings(profile, current_limit, recommended_limit),
            profile: Some(profile.clone()),
        }
    }

    /// Recommend for every profiled endpoint independently.
    pub fn recommend_all(
        &self,
        tier: Tier,
        strategy: Option<Strategy>,
    ) -> Result<Vec<RateLimitRecommendation>, OptimizeError> {
        if !self.is_trained() {
            return Err(OptimizeError::NotTrained);
        }
        Ok(self
            .profiles
            .keys()
            .map(|endpoint| self.recommend(endpoint, tier, None, strategy))
            .collect())
    }

    /// Group profiled endpoints into named traffic-shape buckets.
    pub fn cluster_endpoints(&self, n_clusters: usize) -> BTreeMap<String, Vec<String>> {
        cluster::cluster_endpoints(&self.profiles, n_clusters)
    }

    /// p95 traffic plus headroom, floored at 10, rounded to a nice
    /// number.
    fn base_limit(&self, profile: &EndpointProfile) -> u32 {
        let headroom = 1.0 + self.headroom_percent / 100.0;
        let base = (profile.p95_requests_per_minute * headroom).max(10.0);
        round_to_nice(base)
    }

    fn build_reasoning(&self, profile: &EndpointProfile, strategy: Strategy) -> String {
        let mut reasoning = format!(
            "Based on {} historical requests. Normal traffic: ~{:.0} req/min, \
             Peak traffic: ~{:.0} req/min. Using {} strategy with {}% headroom.",
            profile.total_requests,
            profile.avg_requests_per_minute,
            profile.peak_requests_per_minute,
            strategy,
            self.headroom_percent
        );
        if profile.error_rate > 0.05 {
            reasoning.push_str(&format!(
                " Note: High error rate ({:.1}%) suggests backend issues.",
                profile.error_rate * 100.0
            ));
        }
        reasoning
    }

    fn default_recommendation(
        &self,
        endpoint: &str,
        tier: Tier,
        current_limit: Option<u32>,
        strategy: Strategy,
    ) -> RateLimitRecommendation {
        let config = self.tier_config(tier);
        let recommended_limit =
            (config.base_limit as f64 * strategy.multiplier()).round() as u32;

        RateLimitRecommendation {
            endpoint: endpoint.to_string(),
            tier,
            current_limit,
            recommended_limit,
            recommended_burst: config.burst_size(),
            confidence: 0.3,
            reasoning: format!(
                "No historical data available for endpoint. Using default {} tier limits.",
                tier
            ),
            strategy,
            warnings: vec![
                "No traffic data available. Using default tier configuration.".to_string(),
            ],
            profile: None,
        }
    }

    /// Tier table lookup; the default tier borrows the standard tier's
    /// envelope.
    fn tier_config(&self, tier: Tier) -> TierConfiguration {
        let key = if tier == Tier::Default { Tier::Standard } else { tier };
        self.tier_configs
            .get(&key)
            .cloned()
            .unwrap_or(TierConfiguration {
                tier: key,
                base_limit: 300,
                burst_multiplier: 1.5,
                max_limit: 1000,
                min_limit: 100,
            })
    }

    pub fn info(&self) -> OptimizerInfo {
        OptimizerInfo {
            is_trained: self.is_trained(),
            trained_at: self.trained_at,
            strategy: self.strategy,
            headroom_percent: self.headroom_percent,
            endpoint_count: self.profiles.len(),
            endpoints: self.profiles.keys().cloned().collect(),
        }
    }

    /// Persist profiles and settings so a loaded optimizer reproduces
    /// identical recommendations.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if !self.is_trained() {
            return Err(PersistError::Untrained);
        }
        persist::save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let optimizer: Self = persist::load_json(path)?;
        info!(endpoints = optimizer.profiles.len(), "Optimizer state restored");
        Ok(optimizer)
    }
}

/// Dynamic multiplier for the adaptive strategy: bursty, erroring, or
/// slow endpoints get tightened toward conservative.
fn adaptive_multiplier(profile: &EndpointProfile) -> f64 {
    let variance_factor = (1.0 - profile.time_of_day_variance * 0.3).max(0.5);
    let error_factor = (1.0 - profile.error_rate * 2.0).max(0.5);
    let latency_factor = if profile.avg_latency_ms < 100.0 { 1.0 } else { 0.8 };
    variance_factor * error_factor * latency_factor
}

/// Burst allowance: double the observed typical burst, clamped between
/// ten seconds' worth of the limit and the limit itself.
fn burst_size(profile: &EndpointProfile, rate_limit: u32) -> u32 {
    let min_burst = (rate_limit / 6).max(10);
    let candidate = (profile.typical_burst_size * 2).min(rate_limit);
    round_to_nice(candidate.max(min_burst) as f64)
}

/// More data and steadier traffic mean higher confidence.
fn recommendation_confidence(profile: &EndpointProfile) -> f64 {
    let data_confidence = (profile.total_requests as f64 / 10_000.0).min(1.0);
    let variance_confidence = (1.0 - profile.time_of_day_variance).max(0.3);
    0.6 * data_confidence + 0.4 * variance_confidence
}

fn build_warnings(
    profile: &EndpointProfile,
    current_limit: Option<u32>,
    recommended_limit: u32,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(current) = current_limit {
        if (recommended_limit as f64) < current as f64 * 0.7 {
            warnings.push(format!(
                "Recommended limit is significantly lower than current ({}). \
                 This may affect some users.",
                current
            ));
        }
    }

    if profile.error_rate > 0.1 {
        warnings.push(format!(
            "High error rate ({:.1}%) detected. Consider investigating backend \
             issues before adjusting limits.",
            profile.error_rate * 100.0
        ));
    }

    if profile.time_of_day_variance > 0.8 {
        warnings.push(
            "Traffic has high time-of-day variance. Consider time-based rate limits."
                .to_string(),
        );
    }

    if profile.total_requests < 1000 {
        warnings.push(format!(
            "Limited historical data ({} requests). Recommendation confidence is lower.",
            profile.total_requests
        ));
    }

    warnings
}

/// Round to a human-friendly number. Monotone and deterministic.
pub fn round_to_nice(value: f64) -> u32 {
    if value < 10.0 {
        (value.round() as u32).max(1)
    } else if value < 50.0 {
        ((value / 5.0).round() * 5.0) as u32
    } else if value < 100.0 {
        ((value / 10.0).round() * 10.0) as u32
    } else if value < 500.0 {
        ((value / 25.0).round() * 25.0) as u32
    } else if value < 1000.0 {
        ((value / 50.0).round() * 50.0) as u32
    } else if value < 5000.0 {
        ((value / 100.0).round() * 100.0) as u32
    } else {
        ((value / 500.0).round() * 500.0) as u32
    }
}
