//! Pipeline configuration passed explicitly into the calibration entry point

use clap::ValueEnum;

/// Centroid seeding strategy for the segmentation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InitStrategy {
    /// Spread-maximizing seeding (k-means++)
    #[value(name = "kmeans-pp")]
    KMeansPp,
    /// Uniform random seeding from the observed profiles
    Random,
}

/// All knobs for a single calibration run.
///
/// `cluster_labels` are operator-assigned names for cluster indices, ordered
/// from the lowest-volume cluster to the highest; the segmentation step
/// reorders cluster indices so this mapping holds for any input.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of behavioral segments
    pub n_clusters: usize,
    /// One name per cluster index, ascending by cluster volume
    pub cluster_labels: Vec<String>,
    /// Independent K-Means restarts; the lowest-inertia run is kept
    pub restart_count: usize,
    /// Iteration cap per K-Means run
    pub max_iterations: u64,
    /// Convergence tolerance per K-Means run
    pub tolerance: f64,
    /// Seed for centroid initialization, fixed for reproducibility
    pub seed: u64,
    /// Centroid seeding strategy
    pub init: InitStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            cluster_labels: vec!["small".into(), "medium".into(), "big".into()],
            restart_count: 20,
            max_iterations: 500,
            tolerance: 1e-4,
            seed: 0,
            init: InitStrategy::KMeansPp,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.n_clusters < 2 {
            anyhow::bail!(
                "configuration: at least 2 clusters are required, got {}",
                self.n_clusters
            );
        }
        if self.cluster_labels.len() != self.n_clusters {
            anyhow::bail!(
                "configuration: {} cluster labels for {} clusters",
                self.cluster_labels.len(),
                self.n_clusters
            );
        }
        if self.restart_count == 0 {
            anyhow::bail!("configuration: restart count must be at least 1");
        }
        if self.max_iterations == 0 {
            anyhow::bail!("configuration: iteration cap must be at least 1");
        }
        if !(self.tolerance > 0.0) {
            anyhow::bail!("configuration: tolerance must be positive, got {}", self.tolerance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_clusters, 3);
        assert_eq!(config.cluster_labels, vec!["small", "medium", "big"]);
        assert_eq!(config.init, InitStrategy::KMeansPp);
    }

    #[test]
    fn test_label_count_mismatch_is_rejected() {
        let config = PipelineConfig {
            n_clusters: 4,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("3 cluster labels for 4 clusters"), "{err}");
    }

    #[test]
    fn test_single_cluster_is_rejected() {
        let config = PipelineConfig {
            n_clusters: 1,
            cluster_labels: vec!["only".into()],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_restarts_rejected() {
        let config = PipelineConfig {
            restart_count: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
