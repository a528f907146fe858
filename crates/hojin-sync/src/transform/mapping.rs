//! Column mapping and projection

use serde_json::Value;

use super::batch::FlatBatch;
use crate::catalog::{ColumnSpec, Destination};

/// Rename and fan out flattened columns, then keep only declared destinations.
///
/// Entries are applied in spec order against the working column set. A
/// single destination renames the source column in place; a fan-out appends
/// one verbatim copy per destination. Writing to a name that already exists
/// replaces that column's values. Columns that are not declared
/// destinations, including fan-out sources, are dropped by the final
/// projection.
pub fn map_columns(batch: FlatBatch, spec: &ColumnSpec) -> FlatBatch {
    let (columns, rows) = batch.into_parts();

    // (name, index into the input row)
    let mut working: Vec<(String, usize)> = columns.into_iter().enumerate().map(|(i, c)| (c, i)).collect();

    for (source, destination) in spec.iter() {
        let Some(pos) = working.iter().position(|(name, _)| name == source) else {
            continue;
        };
        let src = working[pos].1;

        match destination {
            Destination::Single(name) => {
                if name == source {
                    continue;
                }
                working.retain(|(n, _)| n != name);
                if let Some(entry) = working.iter_mut().find(|(n, _)| n == source) {
                    entry.0 = name.clone();
                }
            },
            Destination::FanOut(names) => {
                for name in names {
                    match working.iter_mut().find(|(n, _)| n == name) {
                        Some(entry) => entry.1 = src,
                        None => working.push((name.clone(), src)),
                    }
                }
            },
        }
    }

    working.retain(|(name, _)| spec.declares(name));

    let columns = working.iter().map(|(name, _)| name.clone()).collect();
    let rows = rows
        .into_iter()
        .map(|row| {
            working
                .iter()
                .map(|(_, idx)| row.get(*idx).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    FlatBatch::new(columns, rows)
}
