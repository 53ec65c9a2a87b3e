//! Transaction feed loading and amount normalization
//!
//! The feed is a `;`-delimited CSV without a header row:
//!   organization_id; organization_name; amount; kind; currency_code; timestamp
//!
//! Amounts arrive as decimal text with either `.` or `,` as the separator.
//! Rows whose amount or timestamp fails to parse are kept (the feed is never
//! truncated) but excluded from every numeric computation.

use anyhow::Context;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Timestamp layout used by the feed, e.g. `2024-02-01 09:15:00.000`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A feed row as it appears on disk; fields are matched by position.
#[derive(Debug, Clone, Deserialize)]
struct RawRecord {
    organization_id: String,
    organization_name: String,
    amount: String,
    kind: String,
    currency_code: u32,
    timestamp: String,
}

/// An immutable transaction record.
///
/// `amount` is `None` when the row's amount or timestamp failed to parse;
/// such rows carry their identity fields for audit but take no part in
/// aggregation or replay.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub organization_id: String,
    pub organization_name: String,
    pub amount: Option<f64>,
    pub kind: String,
    pub currency_code: u32,
    pub timestamp: Option<NaiveDateTime>,
}

/// Row-level load statistics for the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Rows read from the feed
    pub total_rows: usize,
    /// Rows usable for aggregation and replay
    pub parseable_rows: usize,
    /// Rows whose amount failed to parse
    pub amount_errors: usize,
    /// Rows whose timestamp failed to parse
    pub timestamp_errors: usize,
}

/// The loaded feed plus its load statistics.
#[derive(Debug, Clone)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
    pub summary: LoadSummary,
}

/// Normalize a decimal-as-text amount, accepting `.` or `,` as separator.
///
/// `"1234,56"` and `"1234.56"` yield the identical value. Returns `None`
/// for anything that is not a finite number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Load the transaction feed from a file path.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> crate::Result<TransactionBatch> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("transaction feed: opening {}", path.display()))?;
    load_transactions_from_reader(file)
}

/// Load the transaction feed from any reader.
///
/// Structurally malformed rows (wrong column count, non-numeric currency
/// code) abort the load with a row-numbered error: shape validation is the
/// ingestion collaborator's contract, and a violation means the feed is not
/// the one this pipeline was pointed at. Unparseable amounts or timestamps
/// are row-level data errors and only exclude the affected row.
pub fn load_transactions_from_reader<R: Read>(reader: R) -> crate::Result<TransactionBatch> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut transactions = Vec::new();
    let mut summary = LoadSummary::default();

    for (row, result) in csv_reader.deserialize().enumerate() {
        let raw: RawRecord = result
            .with_context(|| format!("transaction feed: malformed row {}", row + 1))?;
        summary.total_rows += 1;

        let mut amount = parse_amount(&raw.amount);
        if amount.is_none() {
            summary.amount_errors += 1;
            warn!(
                organization_id = %raw.organization_id,
                raw_amount = %raw.amount,
                row = row + 1,
                "unparseable amount, row excluded from aggregation"
            );
        }

        let timestamp = NaiveDateTime::parse_from_str(raw.timestamp.trim(), TIMESTAMP_FORMAT).ok();
        if timestamp.is_none() {
            summary.timestamp_errors += 1;
            // a row without a valid timestamp is excluded entirely
            amount = None;
            warn!(
                organization_id = %raw.organization_id,
                raw_timestamp = %raw.timestamp,
                row = row + 1,
                "unparseable timestamp, row excluded from aggregation"
            );
        }

        if amount.is_some() {
            summary.parseable_rows += 1;
        }

        transactions.push(Transaction {
            organization_id: raw.organization_id,
            organization_name: raw.organization_name,
            amount,
            kind: raw.kind,
            currency_code: raw.currency_code,
            timestamp,
        });
    }

    Ok(TransactionBatch {
        transactions,
        summary,
    })
}
