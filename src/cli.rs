//! Command-line interface definitions and argument parsing

use crate::config::{InitStrategy, PipelineConfig};
use clap::Parser;

/// Payment-anomaly threshold calibration using K-Means clustering on
/// per-organization payment profiles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction feed (`;`-delimited CSV without a header row)
    #[arg(short, long, default_value = "transactions.csv")]
    pub input: String,

    /// Directory for the per-cluster report files
    #[arg(short, long, default_value = "reports")]
    pub output_dir: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Comma-separated cluster labels, ordered from the lowest-volume
    /// cluster to the highest. Example: --labels "small,medium,big"
    #[arg(short, long, default_value = "small,medium,big")]
    pub labels: String,

    /// Independent K-Means restarts; the lowest-inertia run is kept
    #[arg(long, default_value = "20")]
    pub restarts: usize,

    /// Maximum iterations per K-Means run
    #[arg(long, default_value = "500")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Centroid seeding strategy
    #[arg(long, value_enum, default_value = "kmeans-pp")]
    pub init: InitStrategy,

    /// Random seed controlling centroid seeding and restart selection
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the validated pipeline configuration from the parsed arguments.
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        let cluster_labels: Vec<String> = self
            .labels
            .split(',')
            .map(|label| label.trim().to_string())
            .collect();
        if cluster_labels.iter().any(|label| label.is_empty()) {
            anyhow::bail!("cluster labels must be non-empty, got '{}'", self.labels);
        }

        let config = PipelineConfig {
            n_clusters: self.clusters,
            cluster_labels,
            restart_count: self.restarts,
            max_iterations: self.max_iters,
            tolerance: self.tolerance,
            seed: self.seed,
            init: self.init,
        };
        config.validate()?;
        Ok(config)
    }
}
