//! Threshold derivation and false-trigger replay
//!
//! Each cluster's alert threshold is the 90th percentile of its members'
//! `p90_amount` values — a percentile of already-percentile values. That is
//! the production calibration as it stands; tests pin this behavior exactly.
//!
//! The replay never joins tables: an immutable lookup from organization
//! identifier to `(cluster, threshold)` is built once per run, and every
//! transaction is scored only through it. A transaction being compared
//! against another cluster's threshold is therefore structurally impossible.

use crate::aggregate::{percentile, OrganizationProfile};
use crate::data::Transaction;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Below this membership a cluster's threshold is statistically unstable.
pub const MIN_STABLE_CLUSTER_SIZE: usize = 10;

/// Derive the alert threshold for one cluster.
///
/// An empty cluster is a fatal error (the partition upstream guarantees
/// every cluster received at least one profile; an empty one means the
/// configuration requested more clusters than the data supports). A small
/// cluster is flagged in the log but still produces a threshold.
pub fn derive_threshold(cluster: usize, profiles: &[OrganizationProfile]) -> crate::Result<f64> {
    if profiles.is_empty() {
        anyhow::bail!("threshold derivation: cluster {} has no profiles", cluster);
    }
    if profiles.len() < MIN_STABLE_CLUSTER_SIZE {
        warn!(
            cluster,
            size = profiles.len(),
            "threshold derived from a small cluster is statistically unstable"
        );
    }
    let mut p90s: Vec<f64> = profiles.iter().map(|p| p.p90_amount).collect();
    p90s.sort_by(f64::total_cmp);
    percentile(&p90s, 0.9)
        .ok_or_else(|| anyhow::anyhow!("threshold derivation: cluster {} has no profiles", cluster))
}

/// An organization's resolved cluster and threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub cluster: usize,
    pub threshold: f64,
}

/// Immutable mapping from organization identifier to its own cluster's
/// threshold, built once per run from the cluster partition.
#[derive(Debug, Default)]
pub struct ThresholdLookup {
    by_org: HashMap<String, Assignment>,
}

impl ThresholdLookup {
    /// Build the lookup from per-cluster profile sets and their thresholds.
    ///
    /// Fails if the sets and thresholds disagree in length or if any
    /// organization appears in more than one cluster — either would break
    /// the partition invariant the replay depends on.
    pub fn build(
        cluster_sets: &[Vec<OrganizationProfile>],
        thresholds: &[f64],
    ) -> crate::Result<Self> {
        if cluster_sets.len() != thresholds.len() {
            anyhow::bail!(
                "threshold lookup: {} cluster sets but {} thresholds",
                cluster_sets.len(),
                thresholds.len()
            );
        }
        let mut by_org = HashMap::new();
        for (cluster, (set, &threshold)) in cluster_sets.iter().zip(thresholds).enumerate() {
            for profile in set {
                let previous = by_org.insert(
                    profile.organization_id.clone(),
                    Assignment { cluster, threshold },
                );
                if previous.is_some() {
                    anyhow::bail!(
                        "threshold lookup: organization {} assigned to more than one cluster",
                        profile.organization_id
                    );
                }
            }
        }
        Ok(Self { by_org })
    }

    pub fn get(&self, organization_id: &str) -> Option<Assignment> {
        self.by_org.get(organization_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_org.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_org.is_empty()
    }
}

/// Per-organization replay counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerCounts {
    pub total_transactions: u64,
    pub total_errors: u64,
}

/// Replay the raw feed against the per-cluster thresholds.
///
/// Every transaction with a parseable amount is counted exactly once toward
/// its organization's total, and counts as a false trigger when its amount
/// strictly exceeds the organization's own cluster threshold.
pub fn count_false_triggers(
    transactions: &[Transaction],
    lookup: &ThresholdLookup,
) -> HashMap<String, TriggerCounts> {
    let mut counts: HashMap<String, TriggerCounts> = HashMap::new();
    for tx in transactions {
        let Some(amount) = tx.amount else {
            continue;
        };
        let Some(assignment) = lookup.get(&tx.organization_id) else {
            warn!(
                organization_id = %tx.organization_id,
                "transaction for an organization outside every cluster, not counted"
            );
            continue;
        };
        let entry = counts.entry(tx.organization_id.clone()).or_default();
        entry.total_transactions += 1;
        if amount > assignment.threshold {
            entry.total_errors += 1;
        }
    }
    counts
}

/// A fully annotated report row for one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub organization_id: String,
    pub organization_name: String,
    pub p90_amount: f64,
    pub total_amount: f64,
    pub cluster_label: String,
    pub threshold: f64,
    pub total_errors: u64,
    pub total_transactions: u64,
}

/// One cluster's final output: label, threshold and annotated rows.
#[derive(Debug, Clone)]
pub struct AnnotatedCluster {
    pub cluster: usize,
    pub label: String,
    pub threshold: f64,
    pub rows: Vec<ReportRow>,
}

/// Attach the threshold and replay counts to a cluster's profiles.
///
/// Pure transformation: consumes the profile set and returns a new, fully
/// populated cluster. An organization with no transactions in the feed
/// degrades to zero counts with a warning rather than failing the run.
pub fn annotate_cluster(
    cluster: usize,
    label: &str,
    threshold: f64,
    profiles: Vec<OrganizationProfile>,
    counts: &HashMap<String, TriggerCounts>,
) -> AnnotatedCluster {
    let rows = profiles
        .into_iter()
        .map(|profile| {
            let trigger_counts = counts
                .get(&profile.organization_id)
                .copied()
                .unwrap_or_else(|| {
                    warn!(
                        organization_id = %profile.organization_id,
                        cluster,
                        "organization has no transactions in the feed, counting zero"
                    );
                    TriggerCounts::default()
                });
            ReportRow {
                organization_id: profile.organization_id,
                organization_name: profile.organization_name,
                p90_amount: profile.p90_amount,
                total_amount: profile.total_amount,
                cluster_label: label.to_string(),
                threshold,
                total_errors: trigger_counts.total_errors,
                total_transactions: trigger_counts.total_transactions,
            }
        })
        .collect();

    AnnotatedCluster {
        cluster,
        label: label.to_string(),
        threshold,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, p90: f64) -> OrganizationProfile {
        OrganizationProfile {
            organization_id: id.to_string(),
            organization_name: format!("Org {id}"),
            p90_amount: p90,
            total_amount: p90 * 10.0,
        }
    }

    fn tx(id: &str, amount: Option<f64>) -> Transaction {
        Transaction {
            organization_id: id.to_string(),
            organization_name: format!("Org {id}"),
            amount,
            kind: "payment".to_string(),
            currency_code: 643,
            timestamp: None,
        }
    }

    #[test]
    fn test_threshold_is_percentile_of_percentiles() {
        // member p90 values 10..=100: rank position 0.9 * 9 = 8.1,
        // interpolating between 90 and 100 gives 91
        let profiles: Vec<OrganizationProfile> = (1..=10)
            .map(|i| profile(&format!("O{i}"), i as f64 * 10.0))
            .collect();
        let threshold = derive_threshold(0, &profiles).unwrap();
        assert!((threshold - 91.0).abs() < 1e-9, "got {threshold}");
    }

    #[test]
    fn test_constant_p90s_give_that_constant() {
        let profiles = vec![profile("A", 100.0), profile("B", 100.0)];
        assert_eq!(derive_threshold(0, &profiles).unwrap(), 100.0);
    }

    #[test]
    fn test_empty_cluster_is_fatal() {
        let err = derive_threshold(2, &[]).unwrap_err().to_string();
        assert!(err.contains("cluster 2 has no profiles"), "{err}");
    }

    #[test]
    fn test_lookup_rejects_duplicate_assignment() {
        let sets = vec![vec![profile("A", 100.0)], vec![profile("A", 100.0)]];
        let err = ThresholdLookup::build(&sets, &[100.0, 200.0])
            .unwrap_err()
            .to_string();
        assert!(err.contains("more than one cluster"), "{err}");
    }

    #[test]
    fn test_lookup_rejects_length_mismatch() {
        let sets = vec![vec![profile("A", 100.0)]];
        assert!(ThresholdLookup::build(&sets, &[100.0, 200.0]).is_err());
    }

    #[test]
    fn test_strictly_exceeding_amounts_only() {
        let sets = vec![vec![profile("A", 100.0)]];
        let lookup = ThresholdLookup::build(&sets, &[100.0]).unwrap();
        let transactions = vec![
            tx("A", Some(99.0)),
            tx("A", Some(100.0)), // equal is not an error
            tx("A", Some(100.01)),
            tx("A", None), // data error, not counted at all
        ];
        let counts = count_false_triggers(&transactions, &lookup);
        let a = counts["A"];
        assert_eq!(a.total_transactions, 3);
        assert_eq!(a.total_errors, 1);
    }

    #[test]
    fn test_no_cross_cluster_leakage() {
        // org A sits in the low cluster (threshold 100), org B in the high
        // cluster (threshold 1000); B's 500 would trip A's threshold but
        // must only ever be scored against its own
        let sets = vec![vec![profile("A", 100.0)], vec![profile("B", 900.0)]];
        let lookup = ThresholdLookup::build(&sets, &[100.0, 1000.0]).unwrap();
        let transactions = vec![tx("B", Some(500.0)), tx("A", Some(500.0))];
        let counts = count_false_triggers(&transactions, &lookup);

        assert_eq!(counts["B"].total_errors, 0);
        assert_eq!(counts["B"].total_transactions, 1);
        assert_eq!(counts["A"].total_errors, 1);
        assert_eq!(counts["A"].total_transactions, 1);
    }

    #[test]
    fn test_unassigned_organization_is_skipped() {
        let sets = vec![vec![profile("A", 100.0)]];
        let lookup = ThresholdLookup::build(&sets, &[100.0]).unwrap();
        let transactions = vec![tx("GHOST", Some(50.0))];
        let counts = count_false_triggers(&transactions, &lookup);
        assert!(counts.is_empty());
    }

    #[test]
    fn test_annotate_fills_zero_for_absent_organizations() {
        let profiles = vec![profile("A", 100.0), profile("B", 200.0)];
        let mut counts = HashMap::new();
        counts.insert(
            "A".to_string(),
            TriggerCounts {
                total_transactions: 7,
                total_errors: 2,
            },
        );

        let annotated = annotate_cluster(0, "small", 150.0, profiles, &counts);
        assert_eq!(annotated.label, "small");
        assert_eq!(annotated.rows.len(), 2);

        let a = &annotated.rows[0];
        assert_eq!(a.total_transactions, 7);
        assert_eq!(a.total_errors, 2);
        assert_eq!(a.cluster_label, "small");
        assert_eq!(a.threshold, 150.0);

        // B never appears in the feed: zero counts, not a failure
        let b = &annotated.rows[1];
        assert_eq!(b.total_transactions, 0);
        assert_eq!(b.total_errors, 0);
    }

    #[test]
    fn test_errors_never_exceed_totals() {
        let sets = vec![vec![profile("A", 10.0)]];
        let lookup = ThresholdLookup::build(&sets, &[10.0]).unwrap();
        let transactions: Vec<Transaction> =
            (0..50).map(|i| tx("A", Some(i as f64))).collect();
        let counts = count_false_triggers(&transactions, &lookup);
        let a = counts["A"];
        assert!(a.total_errors <= a.total_transactions);
        assert_eq!(a.total_transactions, 50);
        // amounts 11..=49 strictly exceed the threshold of 10
        assert_eq!(a.total_errors, 39);
    }
}
