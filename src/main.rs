//! FraudCal: payment-anomaly threshold calibration CLI
//!
//! This is the main entrypoint that wires arguments and logging into the
//! calibration pipeline and prints the operator-facing report.

use anyhow::Result;
use clap::Parser;
use fraudcal::{pipeline, Args};
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "fraudcal=debug"
    } else {
        "fraudcal=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if args.verbose {
        println!("FraudCal - Payment-Anomaly Threshold Calibration");
        println!("================================================\n");
    }

    let config = args.to_config()?;

    let start_time = Instant::now();

    if args.verbose {
        println!("Input feed: {}", args.input);
        println!(
            "Clusters: {} ({})",
            config.n_clusters,
            config.cluster_labels.join(", ")
        );
        println!(
            "Restarts: {}, max iterations: {}, seed: {}\n",
            config.restart_count, config.max_iterations, config.seed
        );
    }

    let summary = pipeline::run(
        &config,
        Path::new(&args.input),
        Path::new(&args.output_dir),
    )?;

    println!("=== Calibration Report ===");
    println!("Organizations profiled: {}", summary.organizations);
    println!(
        "Rows read: {} ({} usable, {} amount errors, {} timestamp errors)",
        summary.load.total_rows,
        summary.load.parseable_rows,
        summary.load.amount_errors,
        summary.load.timestamp_errors
    );
    for cluster in &summary.clusters {
        println!(
            "Cluster '{}': {} organizations, threshold {:.2}",
            cluster.label,
            cluster.rows.len(),
            cluster.threshold
        );
    }
    println!("\nSilhouette score: {:.3}", summary.silhouette);
    println!("Within-cluster sum of squares: {:.2}", summary.inertia);

    let elapsed = start_time.elapsed();
    println!("\n=== Calibration Complete ===");
    println!("Total processing time: {:.2}s", elapsed.as_secs_f64());
    for path in &summary.report_paths {
        println!("Report written to: {}", path.display());
    }

    Ok(())
}
