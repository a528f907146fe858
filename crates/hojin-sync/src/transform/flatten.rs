//! Record flattening
//!
//! Turns nested record trees into flat rows following a [`FlattenSpec`].
//! Without a record path every record is one row with nested objects
//! dot-flattened (`workplace_info.base_infos.average_age`). With a record
//! path, each object element of the list it resolves to becomes a row, and
//! the meta fields are copied onto it from the top-level record.
//!
//! A path that is missing, or that ends on something other than a list,
//! produces no rows for that record. This is a normal outcome, not an error.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::batch::FlatBatch;
use crate::catalog::{FlattenSpec, MetaField};

type Row = IndexMap<String, Value>;

/// Flatten a batch of records into the union of their rows
pub fn flatten(records: &[Value], spec: &FlattenSpec) -> FlatBatch {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        flatten_record(record, spec, &mut rows);
    }
    FlatBatch::from_rows(rows)
}

fn flatten_record(record: &Value, spec: &FlattenSpec, out: &mut Vec<Row>) {
    let Value::Object(top) = record else {
        return;
    };

    match &spec.record_path {
        None => {
            let mut row = Row::new();
            flatten_object(top, None, &mut row);
            for meta in &spec.meta {
                row.entry(meta.column_name())
                    .or_insert_with(|| resolve_meta(record, meta));
            }
            out.push(row);
        },
        Some(path) => {
            let mut elements = Vec::new();
            collect_elements(record, path, &mut elements);
            if elements.is_empty() {
                return;
            }

            let meta: Vec<(String, Value)> = spec
                .meta
                .iter()
                .map(|m| (m.column_name(), resolve_meta(record, m)))
                .collect();

            for element in elements {
                let Value::Object(fields) = element else {
                    continue;
                };
                let mut row = Row::new();
                flatten_object(fields, None, &mut row);
                for (name, value) in &meta {
                    row.insert(name.clone(), value.clone());
                }
                out.push(row);
            }
        },
    }
}

/// Elements of the list(s) reached through `path`.
///
/// Intermediate objects are descended into and intermediate lists fan out
/// into each element; the final segment must hold a list.
fn collect_elements<'a>(node: &'a Value, path: &[String], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Some(child) = node.as_object().and_then(|m| m.get(head)) else {
        return;
    };

    if rest.is_empty() {
        if let Value::Array(items) = child {
            out.extend(items.iter());
        }
        return;
    }

    match child {
        Value::Object(_) => collect_elements(child, rest, out),
        Value::Array(items) => {
            for item in items {
                collect_elements(item, rest, out);
            }
        },
        _ => {},
    }
}

fn resolve_meta(record: &Value, meta: &MetaField) -> Value {
    meta.segments()
        .iter()
        .try_fold(record, |node, key| node.as_object().and_then(|m| m.get(key)))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Dot-flatten an object; lists and scalars are leaves, empty objects vanish
fn flatten_object(object: &Map<String, Value>, prefix: Option<&str>, row: &mut Row) {
    for (key, value) in object {
        let name = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_object(nested, Some(&name), row),
            leaf => {
                row.insert(name, leaf.clone());
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(path: Option<&[&str]>, meta: Vec<MetaField>) -> FlattenSpec {
        FlattenSpec {
            record_path: path.map(|p| p.iter().map(|s| s.to_string()).collect()),
            meta,
        }
    }

    fn simple(name: &str) -> MetaField {
        MetaField::Simple(name.into())
    }

    #[test]
    fn test_whole_record_dot_flattened() {
        let records = vec![json!({
            "corporate_number": "1234567890123",
            "workplace_info": {
                "base_infos": {"average_age": 41.2},
                "empty": {}
            },
            "tags": ["a", "b"]
        })];
        let batch = flatten(&records, &spec(None, vec![]));

        assert_eq!(batch.columns().len(), 3);
        assert!(batch.has_column("corporate_number"));
        assert!(!batch.has_column("workplace_info.empty"));
        assert_eq!(batch.get(0, "workplace_info.base_infos.average_age"), Some(&json!(41.2)));
        assert_eq!(batch.get(0, "tags"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_record_path_explodes_with_meta() {
        let records = vec![json!({
            "corporate_number": "1",
            "name": "Acme",
            "commendation": [
                {"title": "Prize A", "name": "element name"},
                {"title": "Prize B"},
                "not an object"
            ]
        })];
        let spec = spec(
            Some(&["commendation"]),
            vec![simple("corporate_number"), simple("name"), simple("location")],
        );
        let batch = flatten(&records, &spec);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(0, "title"), Some(&json!("Prize A")));
        // meta wins over the element's own field of the same name
        assert_eq!(batch.get(0, "name"), Some(&json!("Acme")));
        assert_eq!(batch.get(1, "corporate_number"), Some(&json!("1")));
        assert_eq!(batch.get(1, "location"), Some(&Value::Null));
    }

    #[test]
    fn test_non_list_or_missing_path_yields_zero_rows() {
        let spec = spec(Some(&["finance", "management_index"]), vec![simple("corporate_number")]);
        let records = vec![
            json!({"corporate_number": "1"}),
            json!({"corporate_number": "2", "finance": null}),
            json!({"corporate_number": "3", "finance": {"management_index": {"period": "1"}}}),
            json!({"corporate_number": "4", "finance": "text"}),
            json!("not a record"),
        ];
        let batch = flatten(&records, &spec);
        assert!(batch.is_empty());
        assert!(batch.columns().is_empty());
    }

    #[test]
    fn test_nested_path_with_path_meta() {
        let records = vec![json!({
            "corporate_number": "9",
            "finance": {
                "accounting_standards": "Japan GAAP",
                "sh1_n": "Holder",
                "management_index": [{"period": "2023"}, {"period": "2024"}]
            }
        })];
        let spec = spec(
            Some(&["finance", "management_index"]),
            vec![
                simple("corporate_number"),
                MetaField::Path(vec!["finance".into(), "accounting_standards".into()]),
                MetaField::Path(vec!["finance".into(), "sh1_n".into()]),
                MetaField::Path(vec!["finance".into(), "sh2_n".into()]),
            ],
        );
        let batch = flatten(&records, &spec);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(1, "period"), Some(&json!("2024")));
        assert_eq!(batch.get(0, "finance.accounting_standards"), Some(&json!("Japan GAAP")));
        assert_eq!(batch.get(1, "finance.sh1_n"), Some(&json!("Holder")));
        assert_eq!(batch.get(0, "finance.sh2_n"), Some(&Value::Null));
    }

    #[test]
    fn test_meta_columns_present_on_every_row() {
        let records = vec![
            json!({"corporate_number": "1", "patent": [{"a": 1}, {"b": 2}]}),
            json!({"patent": [{"a": 3}]}),
        ];
        let meta = vec![simple("corporate_number"), simple("name")];
        let batch = flatten(&records, &spec(Some(&["patent"]), meta));

        assert_eq!(batch.len(), 3);
        for row in 0..batch.len() {
            assert!(batch.get(row, "corporate_number").is_some());
            assert!(batch.get(row, "name").is_some());
        }
        assert_eq!(batch.get(2, "corporate_number"), Some(&Value::Null));
        // outer-join union pads fields missing from a row
        assert_eq!(batch.get(0, "b"), Some(&Value::Null));
    }

    #[test]
    fn test_intermediate_list_fans_out() {
        let records = vec![json!({
            "groups": [
                {"items": [{"v": 1}, {"v": 2}]},
                {"items": [{"v": 3}]},
                {"items": "none"}
            ]
        })];
        let batch = flatten(&records, &spec(Some(&["groups", "items"]), vec![]));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get(2, "v"), Some(&json!(3)));
    }

    #[test]
    fn test_meta_filled_without_record_path() {
        let records = vec![json!({"corporate_number": "5"})];
        let batch = flatten(&records, &spec(None, vec![simple("corporate_number"), simple("location")]));
        assert_eq!(batch.get(0, "corporate_number"), Some(&json!("5")));
        assert_eq!(batch.get(0, "location"), Some(&Value::Null));
    }
}
