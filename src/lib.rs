//! RateWarden -- API traffic anomaly detection and rate-limit tuning.
//!
//! This crate provides the core library for learning baseline traffic
//! behavior, scoring live metrics for anomalies, profiling per-endpoint
//! traffic, and recommending tier-aware rate limits.

pub mod config;
pub mod detect;
pub mod metrics;
pub mod optimize;
pub mod persist;
pub mod stats;
