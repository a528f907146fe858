//! Pre-flatten field derivations
//!
//! Each [`Enrichment`] rewrites part of a raw record tree in place before the
//! flattener discards its nesting. Every rule recomputes its output fields
//! from the untouched source list, so applying a rule twice yields the same
//! record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_slots() -> usize {
    5
}

fn default_name_fields() -> Vec<String> {
    vec!["name".to_string()]
}

fn default_delimiter() -> String {
    ", ".to_string()
}

/// Ranks `{name, ratio}` entries and injects numbered slots on the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopN {
    /// Path from the record root to the object (or list of objects) holding the list
    pub container: Vec<String>,
    pub list_field: String,
    /// Candidate name fields, first present wins
    #[serde(default = "default_name_fields")]
    pub name_fields: Vec<String>,
    pub ratio_field: String,
    /// Slot key templates; `{}` becomes the 1-based slot number
    pub name_key: String,
    pub ratio_key: String,
    #[serde(default = "default_slots")]
    pub slots: usize,
}

/// One recognized category label and the keys its values land in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub code_key: String,
    #[serde(default)]
    pub text_key: Option<String>,
}

/// Lifts `(code, text)` pairs out of a list of labelled code entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCodes {
    /// Path to the items (objects or list of objects) carrying the entries
    pub items: Vec<String>,
    pub entries_field: String,
    pub label_field: String,
    pub code_field: String,
    pub text_field: String,
    pub categories: Vec<Category>,
}

/// Collapses a list-valued field into one delimited string.
///
/// A string is already in normalized form and is left alone; any other
/// non-list value becomes null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinList {
    pub items: Vec<String>,
    pub field: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Enrichment {
    TopN(TopN),
    CategoryCodes(CategoryCodes),
    JoinList(JoinList),
}

impl Enrichment {
    pub fn apply(&self, record: &mut Value) {
        match self {
            Enrichment::TopN(rule) => {
                for_each_object(record, &rule.container, &mut |obj| rule.apply(obj))
            },
            Enrichment::CategoryCodes(rule) => {
                for_each_object(record, &rule.items, &mut |obj| rule.apply(obj))
            },
            Enrichment::JoinList(rule) => {
                for_each_object(record, &rule.items, &mut |obj| rule.apply(obj))
            },
        }
    }
}

/// Apply `rules` in order to every record
pub fn enrich(records: &mut [Value], rules: &[Enrichment]) {
    if rules.is_empty() {
        return;
    }
    for record in records.iter_mut() {
        for rule in rules {
            rule.apply(record);
        }
    }
}

/// Visit every object reached by descending `path`; lists fan out at any depth
fn for_each_object(node: &mut Value, path: &[String], visit: &mut dyn FnMut(&mut Map<String, Value>)) {
    match node {
        Value::Array(items) => {
            for item in items {
                for_each_object(item, path, visit);
            }
        },
        Value::Object(map) => match path.split_first() {
            None => visit(map),
            Some((head, rest)) => {
                if let Some(child) = map.get_mut(head) {
                    for_each_object(child, rest, visit);
                }
            },
        },
        _ => {},
    }
}

/// Numeric view of a ratio; null, blank and unparsable count as zero
fn ratio_value(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn slot_key(template: &str, slot: usize) -> String {
    template.replace("{}", &slot.to_string())
}

impl TopN {
    fn apply(&self, container: &mut Map<String, Value>) {
        let ranked: Vec<(Value, Value)> = match container.get(&self.list_field) {
            None => Vec::new(),
            Some(Value::Array(entries)) => {
                let mut scored: Vec<(f64, &Value)> = entries
                    .iter()
                    .filter(|e| e.is_object())
                    .map(|e| (ratio_value(e.get(&self.ratio_field)), e))
                    .collect();
                // Vec::sort_by is stable, so equal ratios keep source order
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                scored
                    .into_iter()
                    .take(self.slots)
                    .map(|(_, entry)| {
                        let name = self
                            .name_fields
                            .iter()
                            .find_map(|f| entry.get(f))
                            .cloned()
                            .unwrap_or(Value::Null);
                        let ratio = entry.get(&self.ratio_field).cloned().unwrap_or(Value::Null);
                        (name, ratio)
                    })
                    .collect()
            },
            Some(_) => return,
        };

        let mut ranked = ranked.into_iter();
        for slot in 1..=self.slots {
            let (name, ratio) = ranked.next().unwrap_or((Value::Null, Value::Null));
            container.insert(slot_key(&self.name_key, slot), name);
            container.insert(slot_key(&self.ratio_key, slot), ratio);
        }
    }
}

impl CategoryCodes {
    fn apply(&self, item: &mut Map<String, Value>) {
        let extracted: Vec<(String, Value)> = match item.get(&self.entries_field) {
            Some(Value::Array(entries)) => {
                let mut out = Vec::new();
                for entry in entries {
                    let Some(label) = entry.get(&self.label_field).and_then(Value::as_str) else {
                        continue;
                    };
                    let Some(category) = self.categories.iter().find(|c| c.label == label) else {
                        continue;
                    };
                    let code = entry.get(&self.code_field).cloned().unwrap_or(Value::Null);
                    out.push((category.code_key.clone(), code));
                    if let Some(text_key) = &category.text_key {
                        let text = entry.get(&self.text_field).cloned().unwrap_or(Value::Null);
                        out.push((text_key.clone(), text));
                    }
                }
                out
            },
            // no entries list still yields explicit nulls
            _ => Vec::new(),
        };

        for category in &self.categories {
            item.insert(category.code_key.clone(), Value::Null);
            if let Some(text_key) = &category.text_key {
                item.insert(text_key.clone(), Value::Null);
            }
        }
        // later entries of the same category overwrite earlier ones
        for (key, value) in extracted {
            item.insert(key, value);
        }
    }
}

fn render_element(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl JoinList {
    fn apply(&self, item: &mut Map<String, Value>) {
        let Some(current) = item.get(&self.field) else {
            return;
        };
        let joined = match current {
            Value::String(_) => return,
            Value::Array(values) => Value::String(
                values
                    .iter()
                    .filter_map(render_element)
                    .collect::<Vec<_>>()
                    .join(&self.delimiter),
            ),
            _ => Value::Null,
        };
        item.insert(self.field.clone(), joined);
    }
}
