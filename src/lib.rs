//! FraudCal: payment-anomaly threshold calibration using K-Means clustering
//!
//! This library derives per-organization fraud-alert thresholds from a
//! historical transaction feed. Organizations are profiled by payment volume,
//! partitioned into behavioral segments with K-Means, and each segment's
//! threshold is replayed against the raw feed to count would-have-been
//! false triggers.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod silhouette;
pub mod threshold;

// Re-export public items for easier access
pub use aggregate::{aggregate_profiles, OrganizationProfile};
pub use cli::Args;
pub use config::{InitStrategy, PipelineConfig};
pub use data::{load_transactions, Transaction, TransactionBatch};
pub use model::{fit_segments, SegmentationModel};
pub use pipeline::{run, RunSummary};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
