use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use ratewarden::config::Settings;
use ratewarden::detect::detector::AnomalyDetector;
use ratewarden::detect::realtime::RealTimeDetector;
use ratewarden::metrics::{RequestRecord, TrafficMetrics};
use ratewarden::optimize::engine::RateLimitOptimizer;
use ratewarden::optimize::{RateLimitRecommendation, Strategy, Tier};

#[derive(Parser)]
#[command(
    name = "ratewarden",
    about = "API traffic anomaly detection and rate-limit recommendations",
    version,
    long_about = None
)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the anomaly detector on historical traffic metrics
    Train {
        /// JSON file with an array of metric samples
        #[arg(long)]
        input: PathBuf,

        /// Where to save the trained model
        #[arg(long, default_value = "data/model.json")]
        model: PathBuf,
    },

    /// Score metric samples against a trained model
    Detect {
        /// JSON file with an array of metric samples
        #[arg(long)]
        input: PathBuf,

        /// Trained model path
        #[arg(long, default_value = "data/model.json")]
        model: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Only print anomalous samples
        #[arg(long)]
        anomalies_only: bool,
    },

    /// Replay metric samples through the real-time tracker
    Replay {
        /// JSON file with an array of metric samples, in order
        #[arg(long)]
        input: PathBuf,

        /// Trained model path
        #[arg(long, default_value = "data/model.json")]
        model: PathBuf,
    },

    /// Profile per-endpoint traffic from raw request records
    Analyze {
        /// JSON file with an array of request records
        #[arg(long)]
        input: PathBuf,

        /// Where to save the optimizer state
        #[arg(long, default_value = "data/optimizer.json")]
        state: PathBuf,
    },

    /// Recommend rate limits from analyzed traffic
    Recommend {
        /// Endpoint path to recommend for
        #[arg(long, conflicts_with = "all")]
        endpoint: Option<String>,

        /// Recommend for every profiled endpoint
        #[arg(long)]
        all: bool,

        /// Subscription tier
        #[arg(long, default_value = "default")]
        tier: Tier,

        /// Override the configured strategy
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Currently configured limit, for change warnings
        #[arg(long)]
        current_limit: Option<u32>,

        /// Optimizer state path
        #[arg(long, default_value = "data/optimizer.json")]
        state: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Group endpoints into traffic-shape clusters
    Cluster {
        /// Number of clusters
        #[arg(long, default_value = "3")]
        clusters: usize,

        /// Optimizer state path
        #[arg(long, default_value = "data/optimizer.json")]
        state: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Train { input, model } => {
            let samples = read_metrics(&input)?;
            tracing::info!(samples = samples.len(), "Training detector");

            let mut detector = AnomalyDetector::new(&settings.detector);
            let summary = detector.train(&samples)?;
            detector.save(&model)?;

            println!("\n=== Training Summary ===");
            println!("Samples:         {}", summary.samples);
            println!("Contamination:   {}", summary.contamination);
            println!("Score threshold: {:.4}", summary.score_threshold);
            println!("Model saved to:  {}", model.display());
        }
        Commands::Detect {
            input,
            model,
            json,
            anomalies_only,
        } => {
            let samples = read_metrics(&input)?;
            let detector = AnomalyDetector::load(&model)?;
            let results = detector.detect_batch(&samples)?;

            let selected: Vec<_> = results
                .into_iter()
                .filter(|r| !anomalies_only || r.is_anomaly)
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&selected)?);
            } else {
                let anomalies = selected.iter().filter(|r| r.is_anomaly).count();
                for result in &selected {
                    let flag = if result.is_anomaly { "ANOMALY" } else { "ok" };
                    println!(
                        "{:<8} score={:+.4} confidence={:.2} | {}",
                        flag, result.score, result.confidence, result.explanation
                    );
                }
                println!("\n{} samples, {} anomalous", selected.len(), anomalies);
            }
        }
        Commands::Replay { input, model } => {
            let samples = read_metrics(&input)?;
            let detector = AnomalyDetector::load(&model)?;
            let mut tracker = RealTimeDetector::new(
                detector,
                settings.detector.window_size,
                settings.detector.persistence_threshold,
            );

            for metrics in samples {
                let result = tracker.process(metrics)?;
                if result.is_anomaly {
                    println!(
                        "[{}] score={:+.4} | {}",
                        result.timestamp.format("%H:%M:%S"),
                        result.score,
                        result.explanation
                    );
                }
            }

            if let Some(trend) = tracker.trend() {
                println!("\n=== Window Trends ===");
                println!("Samples:      {}", trend.window_size);
                println!("RPS:          {:?}", trend.rps_trend);
                println!("Latency:      {:?}", trend.latency_trend);
                println!("Errors:       {:?}", trend.error_trend);
                println!("Anomaly rate: {:.1}%", trend.recent_anomaly_rate * 100.0);
            }
        }
        Commands::Analyze { input, state } => {
            let records = read_records(&input)?;
            tracing::info!(records = records.len(), "Analyzing request records");

            let mut optimizer = RateLimitOptimizer::new(&settings.optimizer);
            optimizer.analyze_traffic(&records);
            optimizer.save(&state)?;

            println!(
                "{:<30} | {:>9} | {:>9} | {:>8} | {:>6}",
                "Endpoint", "Avg r/min", "Peak", "Latency", "Errors"
            );
            println!("{:-<30}-|-{:-<9}-|-{:-<9}-|-{:-<8}-|-{:-<6}", "", "", "", "", "");
            for (endpoint, profile) in optimizer.profiles() {
                println!(
                    "{:<30} | {:>9.1} | {:>9.1} | {:>6.1}ms | {:>5.1}%",
                    endpoint,
                    profile.avg_requests_per_minute,
                    profile.peak_requests_per_minute,
                    profile.avg_latency_ms,
                    profile.error_rate * 100.0
                );
            }
            println!("\nState saved to {}", state.display());
        }
        Commands::Recommend {
            endpoint,
            all,
            tier,
            strategy,
            current_limit,
            state,
            json,
        } => {
            let optimizer = RateLimitOptimizer::load(&state)?;

            let recommendations: Vec<RateLimitRecommendation> = if all {
                optimizer.recommend_all(tier, strategy)?
            } else {
                let endpoint = endpoint
                    .context("either --endpoint or --all is required")?;
                vec![optimizer.recommend(&endpoint, tier, current_limit, strategy)]
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&recommendations)?);
            } else {
                for rec in &recommendations {
                    print_recommendation(rec);
                }
            }
        }
        Commands::Cluster { clusters, state } => {
            let optimizer = RateLimitOptimizer::load(&state)?;
            let groups = optimizer.cluster_endpoints(clusters);

            if groups.is_empty() {
                println!("No endpoints to cluster.");
            } else {
                for (name, members) in groups {
                    println!("{} ({} endpoints):", name, members.len());
                    for member in members {
                        println!("  - {}", member);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_recommendation(rec: &RateLimitRecommendation) {
    println!("\n=== {} ({} tier, {} strategy) ===", rec.endpoint, rec.tier, rec.strategy);
    if let Some(current) = rec.current_limit {
        println!("Current limit:     {} req/min", current);
    }
    println!("Recommended limit: {} req/min", rec.recommended_limit);
    println!("Recommended burst: {}", rec.recommended_burst);
    println!("Confidence:        {:.0}%", rec.confidence * 100.0);
    println!("Reasoning:         {}", rec.reasoning);
    for warning in &rec.warnings {
        println!("Warning:           {}", warning);
    }
}

/// Read an array of metric samples. Accepts a single object too.
fn read_metrics(path: &Path) -> Result<Vec<TrafficMetrics>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;

    let items = match &value {
        serde_json::Value::Array(items) => items.as_slice(),
        _ => std::slice::from_ref(&value),
    };
    items
        .iter()
        .map(|item| TrafficMetrics::from_json(item).map_err(Into::into))
        .collect()
}

fn read_records(path: &Path) -> Result<Vec<RequestRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
