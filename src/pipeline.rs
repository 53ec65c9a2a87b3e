//! End-to-end calibration pipeline
//!
//! Stages run strictly forward: ingest, aggregate, segment, score, derive
//! thresholds, replay, report. A fatal error in any stage aborts the run
//! before a single report file is written; only row-level data errors are
//! absorbed (during ingest) and surfaced in the returned summary.

use crate::config::PipelineConfig;
use crate::data::{self, LoadSummary};
use crate::threshold::{self, AnnotatedCluster, ThresholdLookup};
use crate::{aggregate, model, report, silhouette};
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of a completed calibration run.
#[derive(Debug)]
pub struct RunSummary {
    /// Organizations profiled from the feed
    pub organizations: usize,
    /// Full-population silhouette score of the partition
    pub silhouette: f64,
    /// Within-cluster sum of squares of the selected K-Means run
    pub inertia: f64,
    /// Annotated clusters in ascending volume order
    pub clusters: Vec<AnnotatedCluster>,
    /// Row-level feed statistics
    pub load: LoadSummary,
    /// Report files written, in cluster order
    pub report_paths: Vec<PathBuf>,
}

/// Run the full calibration pipeline over one feed snapshot.
pub fn run(config: &PipelineConfig, input: &Path, output_dir: &Path) -> crate::Result<RunSummary> {
    config.validate()?;

    let batch = data::load_transactions(input)?;
    info!(
        rows = batch.summary.total_rows,
        parseable = batch.summary.parseable_rows,
        "feed ingested"
    );

    let profiles = aggregate::aggregate_profiles(&batch.transactions);
    info!(organizations = profiles.len(), "profiles aggregated");

    let segmentation = model::fit_segments(&profiles, config)?;
    let score = silhouette::silhouette_score(&segmentation.features, &segmentation.labels)?;

    let cluster_sets = model::partition_profiles(&profiles, &segmentation);
    let mut thresholds = Vec::with_capacity(cluster_sets.len());
    for (cluster, set) in cluster_sets.iter().enumerate() {
        thresholds.push(threshold::derive_threshold(cluster, set)?);
    }

    let lookup = ThresholdLookup::build(&cluster_sets, &thresholds)?;
    let counts = threshold::count_false_triggers(&batch.transactions, &lookup);

    let clusters: Vec<AnnotatedCluster> = cluster_sets
        .into_iter()
        .zip(&config.cluster_labels)
        .zip(&thresholds)
        .enumerate()
        .map(|(cluster, ((set, label), &thr))| {
            threshold::annotate_cluster(cluster, label, thr, set, &counts)
        })
        .collect();

    let report_paths = report::write_cluster_reports(&clusters, output_dir)?;
    report::log_run_summary(&clusters, score, &batch.summary);

    Ok(RunSummary {
        organizations: profiles.len(),
        silhouette: score,
        inertia: segmentation.inertia,
        clusters,
        load: batch.summary,
        report_paths,
    })
}
