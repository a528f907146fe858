//! Keyed reconciliation of flat batches into destination tables
//!
//! A batch is first staged into a transaction-local landing table shaped
//! like the destination, then merged with one statement:
//!
//! - [`MergeMode::MergeChangedFields`]: insert new keys; for existing keys
//!   overwrite each column whose incoming value is not null, and only touch
//!   the row when that changes something.
//! - [`MergeMode::AppendIfNew`]: insert rows whose key (plus version column)
//!   is not stored yet; never update.
//!
//! Rows whose key is missing or blank are dropped before staging and reported
//! as skipped.

pub mod postgres;
pub mod sql;

pub use postgres::PgReconcileWriter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;

use crate::catalog::TableConfig;
use crate::error::Result;
use crate::transform::FlatBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    AppendIfNew,
    MergeChangedFields,
}

/// Row counts from one or more merges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl MergeCounts {
    pub fn changed(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl AddAssign for MergeCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Where and how a table's batches are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTarget {
    pub table: String,
    pub primary_key: Vec<String>,
    pub mode: MergeMode,
    pub version_column: Option<String>,
}

impl MergeTarget {
    pub fn for_table(table: &TableConfig) -> Self {
        Self {
            table: table.name.clone(),
            primary_key: table.primary_key.columns().to_vec(),
            mode: table.merge,
            version_column: table.version_column.clone(),
        }
    }
}

/// Destination of transformed batches
#[async_trait]
pub trait ReconcileSink: Send + Sync {
    /// Stage `batch` as a fresh landing set and merge it in one transaction
    async fn merge_batch(&self, target: &MergeTarget, batch: FlatBatch) -> Result<MergeCounts>;

    /// Start a landing set that accumulates several chunks before one merge
    async fn open_load(&self, target: &MergeTarget) -> Result<Box<dyn LandingLoad>>;
}

/// An open, accumulating landing set
#[async_trait]
pub trait LandingLoad: Send {
    /// Append a chunk; returns the rows dropped for a missing key
    async fn stage(&mut self, batch: FlatBatch) -> Result<u64>;

    /// Merge everything staged and commit
    async fn finish(self: Box<Self>) -> Result<MergeCounts>;
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Drop rows that cannot be keyed; returns how many were dropped.
///
/// A batch lacking any key column loses every row.
pub fn drop_unkeyed_rows(batch: &mut FlatBatch, key: &[String]) -> u64 {
    let indices: Option<Vec<usize>> = key.iter().map(|k| batch.column_index(k)).collect();
    match indices {
        Some(indices) => batch.retain_rows(|row| indices.iter().all(|&i| !is_blank(&row[i]))) as u64,
        None => batch.retain_rows(|_| false) as u64,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch() -> FlatBatch {
        FlatBatch::new(
            vec!["k".into(), "v".into()],
            vec![
                vec![json!("A"), json!("1")],
                vec![Value::Null, json!("2")],
                vec![json!("  "), json!("3")],
                vec![json!("B"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_drop_unkeyed_rows() {
        let mut b = batch();
        assert_eq!(drop_unkeyed_rows(&mut b, &["k".to_string()]), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(b.get(1, "k"), Some(&json!("B")));
    }

    #[test]
    fn test_missing_key_column_drops_all() {
        let mut b = batch();
        assert_eq!(drop_unkeyed_rows(&mut b, &["k".to_string(), "absent".to_string()]), 4);
        assert!(b.is_empty());
    }

    #[test]
    fn test_counts_accumulate() {
        let mut total = MergeCounts::default();
        total += MergeCounts { inserted: 2, updated: 1, skipped: 0 };
        total += MergeCounts { inserted: 0, updated: 3, skipped: 4 };
        assert_eq!(total, MergeCounts { inserted: 2, updated: 4, skipped: 4 });
        assert_eq!(total.changed(), 6);
    }

    #[test]
    fn test_merge_mode_names() {
        let mode: MergeMode = serde_json::from_value(json!("append_if_new")).unwrap();
        assert_eq!(mode, MergeMode::AppendIfNew);
        assert_eq!(
            serde_json::to_value(MergeMode::MergeChangedFields).unwrap(),
            json!("merge_changed_fields")
        );
    }
}
