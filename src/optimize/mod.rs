//! Rate-limit optimization: traffic profiling, recommendations, clustering.

pub mod cluster;
pub mod engine;
pub mod profile;

use crate::optimize::profile::EndpointProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no traffic analysis available; call analyze_traffic() first")]
    NotTrained,

    #[error("unknown tier '{0}'")]
    UnknownTier(String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
}

/// How aggressively limits are tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Conservative,
    Balanced,
    Permissive,
    /// Multiplier computed per endpoint from variance, error rate, and
    /// latency instead of a fixed factor.
    Adaptive,
}

impl Strategy {
    /// Fixed strategy multiplier; adaptive is resolved per profile.
    pub fn multiplier(&self) -> f64 {
        match self {
            Strategy::Conservative => 0.7,
            Strategy::Balanced => 1.0,
            Strategy::Permissive => 1.3,
            Strategy::Adaptive => 1.0,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Conservative => "conservative",
            Strategy::Balanced => "balanced",
            Strategy::Permissive => "permissive",
            Strategy::Adaptive => "adaptive",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Strategy {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(Strategy::Conservative),
            "balanced" => Ok(Strategy::Balanced),
            "permissive" => Ok(Strategy::Permissive),
            "adaptive" => Ok(Strategy::Adaptive),
            other => Err(OptimizeError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Subscription tiers, lowest to highest service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Default,
    Standard,
    Premium,
    Enterprise,
}

impl Tier {
    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Free => 0.5,
            Tier::Basic => 0.75,
            Tier::Default => 1.0,
            Tier::Standard => 1.5,
            Tier::Premium => 2.5,
            Tier::Enterprise => 5.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Default => "default",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Tier {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "default" => Ok(Tier::Default),
            "standard" => Ok(Tier::Standard),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(OptimizeError::UnknownTier(other.to_string())),
        }
    }
}

/// Static per-tier limit envelope. Constant at runtime; overridable at
/// optimizer construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfiguration {
    pub tier: Tier,
    /// Requests per minute.
    pub base_limit: u32,
    pub burst_multiplier: f64,
    pub max_limit: u32,
    pub min_limit: u32,
}

impl TierConfiguration {
    pub fn burst_size(&self) -> u32 {
        (self.base_limit as f64 * self.burst_multiplier) as u32
    }
}

/// Out-of-box tier table.
pub fn default_tier_configs() -> BTreeMap<Tier, TierConfiguration> {
    [
        (Tier::Free, 60, 1.2, 100, 10),
        (Tier::Basic, 100, 1.5, 300, 30),
        (Tier::Standard, 300, 1.5, 1000, 100),
        (Tier::Premium, 1000, 2.0, 5000, 300),
        (Tier::Enterprise, 5000, 2.5, 50000, 1000),
    ]
    .into_iter()
    .map(|(tier, base_limit, burst_multiplier, max_limit, min_limit)| {
        (
            tier,
            TierConfiguration {
                tier,
                base_limit,
                burst_multiplier,
                max_limit,
                min_limit,
            },
        )
    })
    .collect()
}

/// Tier/strategy-adjusted limit suggestion. Recomputed fresh per call,
/// never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecommendation {
    pub endpoint: String,
    pub tier: Tier,
    pub current_limit: Option<u32>,
    pub recommended_limit: u32,
    pub recommended_burst: u32,
    pub confidence: f64,
    pub reasoning: String,
    pub strategy: Strategy,
    pub warnings: Vec<String>,
    pub profile: Option<EndpointProfile>,
}
