//! Per-organization payment profiles
//!
//! Reduces the raw feed to one row per organization identifier: the 90th
//! percentile of its payment amounts and its total payment volume. These two
//! features are the entire input to the segmentation step.

use crate::data::Transaction;
use std::collections::HashMap;
use tracing::warn;

/// Aggregated payment behavior for one organization.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationProfile {
    pub organization_id: String,
    pub organization_name: String,
    /// 90th percentile of the organization's payment amounts
    pub p90_amount: f64,
    /// Sum of the organization's payment amounts
    pub total_amount: f64,
}

/// Percentile with linear interpolation between order statistics.
///
/// `sorted` must be ascending; `q` is in `[0, 1]`. Returns `None` on an
/// empty slice. For `q = 0.9` over `[10, 20, 30, 40]` the rank position is
/// `0.9 * 3 = 2.7`, giving `30 + 0.7 * (40 - 30) = 37`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    debug_assert!((0.0..=1.0).contains(&q));
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

struct OrgAccumulator {
    name: String,
    amounts: Vec<f64>,
    name_conflict_logged: bool,
}

/// Reduce the feed to one profile per organization identifier.
///
/// Rows with `amount = None` are skipped. An identifier mapping to several
/// display names is a data-quality condition: the first-seen name wins and
/// the conflict is logged once per identifier. Organizations without a
/// single parseable amount yield no profile. The output is sorted by
/// identifier so repeated runs see profiles in the same order.
pub fn aggregate_profiles(transactions: &[Transaction]) -> Vec<OrganizationProfile> {
    let mut orgs: HashMap<String, OrgAccumulator> = HashMap::new();

    for tx in transactions {
        let acc = orgs
            .entry(tx.organization_id.clone())
            .or_insert_with(|| OrgAccumulator {
                name: tx.organization_name.clone(),
                amounts: Vec::new(),
                name_conflict_logged: false,
            });
        if acc.name != tx.organization_name && !acc.name_conflict_logged {
            acc.name_conflict_logged = true;
            warn!(
                organization_id = %tx.organization_id,
                first_seen = %acc.name,
                also_seen = %tx.organization_name,
                "organization identifier maps to multiple display names, keeping the first-seen name"
            );
        }
        if let Some(amount) = tx.amount {
            acc.amounts.push(amount);
        }
    }

    let mut profiles = Vec::with_capacity(orgs.len());
    for (organization_id, mut acc) in orgs {
        if acc.amounts.is_empty() {
            warn!(
                organization_id = %organization_id,
                "organization has no parseable amounts, no profile created"
            );
            continue;
        }
        acc.amounts.sort_by(f64::total_cmp);
        let p90_amount = match percentile(&acc.amounts, 0.9) {
            Some(value) => value,
            None => continue,
        };
        let total_amount = acc.amounts.iter().sum();
        profiles.push(OrganizationProfile {
            organization_id,
            organization_name: acc.name,
            p90_amount,
            total_amount,
        });
    }

    profiles.sort_by(|a, b| a.organization_id.cmp(&b.organization_id));
    profiles
}
