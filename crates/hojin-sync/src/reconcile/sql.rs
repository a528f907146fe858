//! SQL text for landing tables and keyed merges
//!
//! Builders only; execution lives in [`super::postgres`]. Every identifier is
//! double-quoted. Names come from the validated catalog.

/// Ordinal column appended to every landing table to remember arrival order
pub const LANDING_SEQ: &str = "__landing_seq";

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn prefixed_list(alias: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{}.{}", alias, quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn landing_table(table: &str) -> String {
    format!("{}__landing", table)
}

pub fn drop_landing(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(&landing_table(table)))
}

/// Empty temp table typed like the destination's `columns`, gone at commit or rollback
pub fn create_landing(table: &str, columns: &[String]) -> String {
    format!(
        "CREATE TEMP TABLE {landing} ON COMMIT DROP AS SELECT {cols} FROM {dest} WITH NO DATA",
        landing = quote_ident(&landing_table(table)),
        cols = quoted_list(columns),
        dest = quote_ident(table),
    )
}

pub fn add_landing_seq(table: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} BIGINT NOT NULL",
        quote_ident(&landing_table(table)),
        quote_ident(LANDING_SEQ)
    )
}

/// Load a JSON array of row objects (`$1`) into the landing table.
///
/// Values are coerced through the destination's row type; `$2` offsets the
/// ordinal so appended chunks keep counting.
pub fn insert_landing(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {landing} ({cols}, {seq}) \
         SELECT {r_cols}, $2::bigint + e.ord \
         FROM jsonb_array_elements($1::jsonb) WITH ORDINALITY AS e(doc, ord) \
         CROSS JOIN LATERAL jsonb_populate_record(NULL::{dest}, e.doc) AS r",
        landing = quote_ident(&landing_table(table)),
        cols = quoted_list(columns),
        seq = quote_ident(LANDING_SEQ),
        r_cols = prefixed_list("r", columns),
        dest = quote_ident(table),
    )
}

/// Upsert with per-column null coalescing.
///
/// The latest landing row per key wins. Conflicting rows are updated only
/// when the coalesced result differs from the stored row, so no-ops are not
/// returned. Yields one row `(inserted, updated)`.
pub fn merge_changed_fields(table: &str, columns: &[String], key: &[String]) -> String {
    let non_key: Vec<&String> = columns.iter().filter(|c| !key.contains(c)).collect();
    let coalesced: Vec<String> = non_key
        .iter()
        .map(|c| format!("COALESCE(EXCLUDED.{q}, d.{q})", q = quote_ident(c)))
        .collect();

    let conflict = if non_key.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments = non_key
            .iter()
            .zip(&coalesced)
            .map(|(c, v)| format!("{} = {}", quote_ident(c), v))
            .collect::<Vec<_>>()
            .join(", ");
        let current = non_key
            .iter()
            .map(|c| format!("d.{}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "DO UPDATE SET {} WHERE ROW({}) IS DISTINCT FROM ROW({})",
            assignments,
            current,
            coalesced.join(", ")
        )
    };

    format!(
        "WITH merged AS (\
         INSERT INTO {dest} AS d ({cols}) \
         SELECT DISTINCT ON ({keys}) {cols} FROM {landing} \
         ORDER BY {keys}, {seq} DESC \
         ON CONFLICT ({keys}) {conflict} \
         RETURNING (xmax = 0) AS inserted) \
         SELECT COUNT(*) FILTER (WHERE inserted), COUNT(*) FILTER (WHERE NOT inserted) FROM merged",
        dest = quote_ident(table),
        cols = quoted_list(columns),
        keys = quoted_list(key),
        landing = quote_ident(&landing_table(table)),
        seq = quote_ident(LANDING_SEQ),
        conflict = conflict,
    )
}

/// Insert landing rows whose key (plus `version`, when given) is not yet stored.
///
/// Never updates. Yields one row `(inserted)`.
pub fn append_if_new(table: &str, columns: &[String], key: &[String], version: Option<&str>) -> String {
    let mut match_cols: Vec<String> = key.to_vec();
    let mut predicates: Vec<String> = key
        .iter()
        .map(|k| format!("x.{q} = l.{q}", q = quote_ident(k)))
        .collect();
    if let Some(v) = version {
        if !key.iter().any(|k| k == v) {
            match_cols.push(v.to_string());
            predicates.push(format!("x.{q} IS NOT DISTINCT FROM l.{q}", q = quote_ident(v)));
        }
    }

    format!(
        "WITH appended AS (\
         INSERT INTO {dest} ({cols}) \
         SELECT DISTINCT ON ({l_match}) {l_cols} FROM {landing} AS l \
         WHERE NOT EXISTS (SELECT 1 FROM {dest} AS x WHERE {predicates}) \
         ORDER BY {l_match}, l.{seq} DESC \
         ON CONFLICT DO NOTHING \
         RETURNING 1) \
         SELECT COUNT(*) FROM appended",
        dest = quote_ident(table),
        cols = quoted_list(columns),
        l_match = prefixed_list("l", &match_cols),
        l_cols = prefixed_list("l", columns),
        landing = quote_ident(&landing_table(table)),
        predicates = predicates.join(" AND "),
        seq = quote_ident(LANDING_SEQ),
    )
}
