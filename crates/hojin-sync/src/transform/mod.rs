//! Record transformation
//!
//! Raw records pass through three stages before they reach a writer:
//!
//! 1. [`enrich`]: derived fields computed on the nested tree
//! 2. [`flatten`]: nested records exploded into flat rows
//! 3. [`map_columns`]: rows renamed and projected onto destination columns
//!
//! All three are pure functions of the batch and the table's catalog entry.

pub mod batch;
pub mod enrich;
pub mod flatten;
pub mod mapping;

pub use batch::FlatBatch;
pub use enrich::{enrich, Enrichment};
pub use flatten::flatten;
pub use mapping::map_columns;

use serde_json::Value;

use crate::catalog::TableConfig;

/// Run one batch of raw records through every stage for `table`
pub fn transform(mut records: Vec<Value>, table: &TableConfig) -> FlatBatch {
    enrich(&mut records, &table.enrich);
    let flat = flatten(&records, &table.flatten);
    map_columns(flat, &table.columns)
}
