//! Runtime settings with TOML overrides.

use crate::optimize::Strategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for the anomaly detector and its real-time wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Expected fraction of anomalous samples in training data; drives
    /// threshold calibration.
    pub contamination: f64,
    /// Trees in the isolation forest.
    pub n_estimators: usize,
    /// Seed for reproducible training.
    pub random_state: u64,
    /// Z-score multiplier above which a feature fires a candidate type.
    pub threshold_multiplier: f64,
    /// Sliding-window capacity for real-time tracking.
    pub window_size: usize,
    /// Consecutive anomalies needed to confirm a persistent anomaly.
    pub persistence_threshold: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            random_state: 42,
            threshold_multiplier: 2.0,
            window_size: 60,
            persistence_threshold: 3,
        }
    }
}

/// Tunables for the rate-limit optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub strategy: Strategy,
    /// Percentage buffer above observed p95 traffic.
    pub headroom_percent: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Balanced,
            headroom_percent: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detector: DetectorSettings,
    pub optimizer: OptimizerSettings,
}

impl Settings {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.detector.contamination, 0.1);
        assert_eq!(s.detector.window_size, 60);
        assert_eq!(s.optimizer.headroom_percent, 20.0);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let s: Settings = toml::from_str(
            "[detector]\ncontamination = 0.05\n\n[optimizer]\nstrategy = \"conservative\"\n",
        )
        .unwrap();
        assert_eq!(s.detector.contamination, 0.05);
        assert_eq!(s.detector.n_estimators, 100);
        assert_eq!(s.optimizer.strategy, Strategy::Conservative);
    }
}
