//! Table catalog
//!
//! The catalog is the static, versioned description of every destination
//! table: where its records come from, how nested records become rows, which
//! source paths map to which columns, and how rows are merged. It is plain
//! data (`tables.toml`), loaded once and shared read-only.
//!
//! ```toml
//! [[tables]]
//! name = "award_information_gbizinfo"
//! primary_key = ["corporate_number", "award_name"]
//! merge = "merge_changed_fields"
//!
//! [tables.source]
//! kind = "paged"
//! endpoint = "/commendation"
//!
//! [tables.flatten]
//! record_path = ["commendation"]
//! meta = ["corporate_number", "name", "location"]
//!
//! [tables.columns]
//! corporate_number = "corporate_number"
//! name = ["corporate_name", "award_corporate_name"]
//! title = "award_name"
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::reconcile::MergeMode;
use crate::transform::enrich::Enrichment;

/// Catalog shipped with the binary
const BUILTIN_CATALOG: &str = include_str!("../../catalog/tables.toml");

/// PostgreSQL truncates identifiers beyond this many bytes
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Table '{table}': {reason}")]
    Invalid { table: String, reason: String },

    #[error("Duplicate table '{0}' in catalog")]
    DuplicateTable(String),

    #[error("Table '{0}' is not in the catalog")]
    UnknownTable(String),
}

/// A field copied from the top-level record onto every exploded row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaField {
    Simple(String),
    Path(Vec<String>),
}

impl MetaField {
    /// Key segments, top-level first
    pub fn segments(&self) -> &[String] {
        match self {
            MetaField::Simple(name) => std::slice::from_ref(name),
            MetaField::Path(path) => path,
        }
    }

    /// Column name on the flat row (segments joined with `.`)
    pub fn column_name(&self) -> String {
        self.segments().join(".")
    }
}

/// How one record tree becomes rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenSpec {
    /// Keys leading to the list to explode; the whole record is one row when absent
    #[serde(default)]
    pub record_path: Option<Vec<String>>,
    #[serde(default)]
    pub meta: Vec<MetaField>,
}

/// Destination of one source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Single(String),
    /// Verbatim copy into every listed column
    FanOut(Vec<String>),
}

impl Destination {
    pub fn names(&self) -> &[String] {
        match self {
            Destination::Single(name) => std::slice::from_ref(name),
            Destination::FanOut(names) => names,
        }
    }
}

/// Ordered map from flattened source column to destination column(s)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSpec(pub IndexMap<String, Destination>);

impl ColumnSpec {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Destination)> {
        self.0.iter()
    }

    /// Every declared destination name, in declaration order
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.0.values().flat_map(|d| d.names().iter().map(String::as_str))
    }

    pub fn declares(&self, column: &str) -> bool {
        self.destinations().any(|d| d == column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Destination)> for ColumnSpec {
    fn from_iter<I: IntoIterator<Item = (String, Destination)>>(iter: I) -> Self {
        ColumnSpec(iter.into_iter().collect())
    }
}

/// Ordered, non-empty conflict key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(pub Vec<String>);

impl PrimaryKey {
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }
}

/// Form submission that yields a bulk archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BulkRequest {
    /// Fetch `landing_url`, lift the hidden `token_field` input, then POST it
    /// together with `selector_field = selector` to `download_url`
    TokenGated {
        landing_url: String,
        download_url: String,
        token_field: String,
        selector_field: String,
        selector: String,
        #[serde(default)]
        extra_params: IndexMap<String, String>,
    },
    /// POST `params` to `download_url`
    Direct {
        download_url: String,
        #[serde(default)]
        params: IndexMap<String, String>,
    },
}

fn default_encoding() -> String {
    "shift_jis".to_string()
}

/// Bulk archive source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSpec {
    pub request: BulkRequest,
    /// Suffix identifying the single payload entry inside the archive
    pub entry_suffix: String,
    /// WHATWG label of the payload encoding
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Declared columns of headerless payloads; the first row is the header when absent
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// gBizINFO update API endpoint suffix (`""` for basic information)
    Paged { endpoint: String },
    Bulk(BulkSpec),
}

impl SourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::Paged { .. } => "paged",
            SourceSpec::Bulk(_) => "bulk",
        }
    }
}

/// Everything needed to sync one destination table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub flatten: FlattenSpec,
    #[serde(default)]
    pub enrich: Vec<Enrichment>,
    pub columns: ColumnSpec,
    pub primary_key: PrimaryKey,
    pub merge: MergeMode,
    /// Extra key column for append-if-new matching
    #[serde(default)]
    pub version_column: Option<String>,
}

impl TableConfig {
    fn invalid(&self, reason: impl Into<String>) -> CatalogError {
        CatalogError::Invalid {
            table: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        validate_identifier(&self.name).map_err(|r| self.invalid(r))?;

        if self.columns.is_empty() {
            return Err(self.invalid("column spec is empty"));
        }
        for (source, dest) in self.columns.iter() {
            if dest.names().is_empty() {
                return Err(self.invalid(format!("'{}' has no destination", source)));
            }
            for name in dest.names() {
                validate_identifier(name).map_err(|r| self.invalid(r))?;
            }
        }

        if self.primary_key.0.is_empty() {
            return Err(self.invalid("primary key is empty"));
        }
        for column in self.primary_key.columns() {
            if !self.columns.declares(column) {
                return Err(self.invalid(format!(
                    "primary key column '{}' is not a declared destination",
                    column
                )));
            }
        }

        if let Some(version) = &self.version_column {
            if !self.columns.declares(version) {
                return Err(self.invalid(format!(
                    "version column '{}' is not a declared destination",
                    version
                )));
            }
        }

        if let Some(path) = &self.flatten.record_path {
            if path.is_empty() {
                return Err(self.invalid("record_path must not be empty when present"));
            }
        }

        if let SourceSpec::Bulk(bulk) = &self.source {
            if encoding_rs::Encoding::for_label(bulk.encoding.as_bytes()).is_none() {
                return Err(self.invalid(format!("unknown encoding '{}'", bulk.encoding)));
            }
            if matches!(&bulk.columns, Some(cols) if cols.is_empty()) {
                return Err(self.invalid("declared bulk columns must not be empty"));
            }
        }

        Ok(())
    }
}

/// Validate a bare PostgreSQL identifier (letters, digits, underscores)
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("identifier must not be empty".to_string());
    };
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{}' exceeds {} bytes",
            name, MAX_IDENTIFIER_LEN
        ));
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(format!(
            "identifier '{}' must start with a letter or underscore",
            name
        ));
    }
    if let Some(ch) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(format!("identifier '{}' contains invalid character '{}'", name, ch));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    tables: Vec<TableConfig>,
}

/// Immutable, ordered set of table configurations
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableConfig>,
}

impl Catalog {
    /// The catalog embedded at build time
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::new(file.tables)
    }

    pub fn new(tables: Vec<TableConfig>) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        for table in &tables {
            table.validate()?;
            if !names.insert(table.name.clone()) {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[TableConfig] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Result<&TableConfig, CatalogError> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    /// Tables in catalog order, restricted to `names` when non-empty
    pub fn select(&self, names: &[String]) -> Result<Vec<&TableConfig>, CatalogError> {
        if names.is_empty() {
            return Ok(self.tables.iter().collect());
        }
        for name in names {
            self.get(name)?;
        }
        Ok(self
            .tables
            .iter()
            .filter(|t| names.iter().any(|n| *n == t.name))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[tables]]
        name = "award_information_gbizinfo"
        primary_key = ["corporate_number", "award_name"]
        merge = "merge_changed_fields"

        [tables.source]
        kind = "paged"
        endpoint = "/commendation"

        [tables.flatten]
        record_path = ["commendation"]
        meta = ["corporate_number", ["finance", "fiscal_year_cover_page"]]

        [tables.columns]
        corporate_number = "corporate_number"
        name = ["corporate_name", "award_corporate_name"]
        title = "award_name"
    "#;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.tables().len(), 9);
        assert_eq!(catalog.tables()[0].name, "corporate_basic_information_gbizinfo");
        assert!(matches!(
            catalog.get("corporate_registry_nta").unwrap().source,
            SourceSpec::Bulk(_)
        ));
    }

    #[test]
    fn test_builtin_paged_endpoints() {
        let catalog = Catalog::builtin().unwrap();
        let endpoints: Vec<_> = catalog
            .tables()
            .iter()
            .filter_map(|t| match &t.source {
                SourceSpec::Paged { endpoint } => Some(endpoint.as_str()),
                SourceSpec::Bulk(_) => None,
            })
            .collect();
        assert_eq!(
            endpoints,
            vec![
                "",
                "/certification",
                "/commendation",
                "/finance",
                "/patent",
                "/procurement",
                "/subsidy",
                "/workplace"
            ]
        );
    }

    #[test]
    fn test_parse_meta_and_fan_out() {
        let catalog = Catalog::from_toml(MINIMAL).unwrap();
        let table = &catalog.tables()[0];

        assert_eq!(
            table.flatten.meta,
            vec![
                MetaField::Simple("corporate_number".into()),
                MetaField::Path(vec!["finance".into(), "fiscal_year_cover_page".into()]),
            ]
        );
        assert_eq!(table.flatten.meta[1].column_name(), "finance.fiscal_year_cover_page");
        assert_eq!(
            table.columns.0.get("name"),
            Some(&Destination::FanOut(vec![
                "corporate_name".into(),
                "award_corporate_name".into()
            ]))
        );
        assert_eq!(table.merge, MergeMode::MergeChangedFields);
    }

    #[test]
    fn test_column_order_preserved() {
        let catalog = Catalog::from_toml(MINIMAL).unwrap();
        let keys: Vec<_> = catalog.tables()[0].columns.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["corporate_number", "name", "title"]);
    }

    #[test]
    fn test_primary_key_must_be_declared() {
        let text = MINIMAL.replace(r#"["corporate_number", "award_name"]"#, r#"["corporate_number", "nope"]"#);
        let err = Catalog::from_toml(&text).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));
    }

    #[test]
    fn test_empty_primary_key_rejected() {
        let text = MINIMAL.replace(r#"["corporate_number", "award_name"]"#, "[]");
        assert!(Catalog::from_toml(&text).is_err());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let text = format!("{}\n{}", MINIMAL, MINIMAL);
        let err = Catalog::from_toml(&text).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTable(_)));
    }

    #[test]
    fn test_select_unknown_table() {
        let catalog = Catalog::from_toml(MINIMAL).unwrap();
        let err = catalog.select(&["missing".to_string()]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTable(_)));
        assert_eq!(catalog.select(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("corporate_number").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("a;drop").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }
}
