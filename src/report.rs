//! Report artifacts and run-summary logging
//!
//! One CSV file per cluster, named after the operator-assigned label, plus
//! a logged summary of thresholds, sizes and the quality score.

use crate::data::LoadSummary;
use crate::threshold::{AnnotatedCluster, MIN_STABLE_CLUSTER_SIZE};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Write one CSV artifact per cluster into `out_dir`.
///
/// Files are named `<label>_cluster_report.csv` and carry a header row of
/// `organization_id, organization_name, p90_amount, total_amount,
/// cluster_label, threshold, total_errors, total_transactions`. Returns the
/// written paths in cluster order.
pub fn write_cluster_reports(
    clusters: &[AnnotatedCluster],
    out_dir: &Path,
) -> crate::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("report: creating output directory {}", out_dir.display()))?;

    let mut paths = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let path = out_dir.join(format!("{}_cluster_report.csv", cluster.label));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("report: creating {}", path.display()))?;
        for row in &cluster.rows {
            writer
                .serialize(row)
                .with_context(|| format!("report: writing {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("report: flushing {}", path.display()))?;
        info!(path = %path.display(), rows = cluster.rows.len(), "cluster report written");
        paths.push(path);
    }
    Ok(paths)
}

/// Log the operator-facing run summary.
pub fn log_run_summary(clusters: &[AnnotatedCluster], silhouette: f64, load: &LoadSummary) {
    info!(
        total_rows = load.total_rows,
        parseable_rows = load.parseable_rows,
        amount_errors = load.amount_errors,
        timestamp_errors = load.timestamp_errors,
        "transaction feed loaded"
    );
    for cluster in clusters {
        info!(
            cluster = cluster.cluster,
            label = %cluster.label,
            organizations = cluster.rows.len(),
            threshold = cluster.threshold,
            "cluster threshold"
        );
        if cluster.rows.len() < MIN_STABLE_CLUSTER_SIZE {
            warn!(
                label = %cluster.label,
                organizations = cluster.rows.len(),
                "cluster is small, treat its threshold as unstable"
            );
        }
    }
    info!(silhouette, "clustering quality score");
}
