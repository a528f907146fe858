//! Column-oriented flat batch

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Rows of one fetch batch sharing a batch-local column set.
///
/// Every row has exactly `columns.len()` cells. The column set varies from
/// batch to batch; consumers must not assume a fixed width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatBatch {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl FlatBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Outer-join union of keyed rows: columns in first-seen order, gaps filled with null
    pub fn from_rows(keyed: Vec<IndexMap<String, Value>>) -> Self {
        let mut seen: IndexSet<&str> = IndexSet::new();
        for row in &keyed {
            seen.extend(row.keys().map(String::as_str));
        }
        let columns: Vec<String> = seen.into_iter().map(str::to_string).collect();
        let rows = keyed
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|c| row.swap_remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell of `row` in column `name`
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Keep rows for which `keep` returns true, returning how many were dropped
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[Value]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        before - self.rows.len()
    }

    /// Rows as JSON objects keyed by column, for landing-table loads
    pub fn to_json_rows(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let object: Map<String, Value> = self
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    Value::Object(object)
                })
                .collect(),
        )
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyed(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_union_in_first_seen_order() {
        let batch = FlatBatch::from_rows(vec![
            keyed(&[("a", json!(1)), ("b", json!(2))]),
            keyed(&[("c", json!(3)), ("a", json!(4))]),
        ]);

        assert_eq!(batch.columns(), &["a", "b", "c"]);
        assert_eq!(batch.rows()[0], vec![json!(1), json!(2), Value::Null]);
        assert_eq!(batch.rows()[1], vec![json!(4), Value::Null, json!(3)]);
    }

    #[test]
    fn test_retain_reports_dropped() {
        let mut batch = FlatBatch::from_rows(vec![
            keyed(&[("k", json!("A"))]),
            keyed(&[("k", Value::Null)]),
        ]);
        let dropped = batch.retain_rows(|r| !r[0].is_null());
        assert_eq!(dropped, 1);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_to_json_rows() {
        let batch = FlatBatch::new(
            vec!["k".into(), "x".into()],
            vec![vec![json!("A"), json!(["p", "q"])]],
        );
        assert_eq!(batch.to_json_rows(), json!([{"k": "A", "x": ["p", "q"]}]));
        assert_eq!(batch.get(0, "x"), Some(&json!(["p", "q"])));
        assert_eq!(batch.get(0, "missing"), None);
    }
}
