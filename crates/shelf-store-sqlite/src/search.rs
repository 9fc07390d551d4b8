//! Adaptive keyword search.
//!
//! Both strategies run the same `LIKE` query over the source columns for the
//! literal keyword and its phonetic variants. They differ only in how
//! initials-like keywords are matched: the scan strategy recomputes initials
//! keys in process, the index strategy reads them from the shadow columns.
//! Results are in ascending identity order either way.

use std::collections::BTreeMap;

use rusqlite::{Connection, params_from_iter};
use shelf_core::{
  record::{Record, RecordId},
  schema::{ID_COLUMN, Schema},
  search::{KeywordVariants, SearchStrategy, like_pattern, select_strategy},
};
use tracing::debug;

use crate::{
  derived::record_count,
  encode::decode_record,
  schema::{quote, select_records_sql},
};

pub(crate) fn all_records(conn: &Connection, schema: &Schema) -> rusqlite::Result<Vec<Record>> {
  let sql = format!("{} ORDER BY {}", select_records_sql(schema), quote(ID_COLUMN));
  let mut stmt = conn.prepare(&sql)?;
  let records = stmt
    .query_map([], |row| decode_record(row, schema))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(records)
}

/// Run `variants` against the store. An empty keyword returns every record.
pub(crate) fn run(
  conn: &Connection,
  schema: &Schema,
  variants: &KeywordVariants,
  small_threshold: usize,
  derived_enabled: bool,
) -> rusqlite::Result<Vec<Record>> {
  if variants.literal.is_empty() {
    return all_records(conn, schema);
  }

  let count = record_count(conn)?;
  let strategy = select_strategy(count, small_threshold, derived_enabled);
  debug!(?strategy, count, keyword = %variants.literal, "search");

  match strategy {
    SearchStrategy::Scan => scan(conn, schema, variants),
    SearchStrategy::Index => index(conn, schema, variants),
  }
}

fn scan(
  conn: &Connection,
  schema: &Schema,
  variants: &KeywordVariants,
) -> rusqlite::Result<Vec<Record>> {
  let mut matched: BTreeMap<RecordId, Record> = like_matches(conn, schema, variants, false)?
    .into_iter()
    .map(|r| (r.id, r))
    .collect();

  if variants.initials_query {
    let eligible: Vec<&str> = schema.derived_columns().map(|c| c.name.as_str()).collect();
    for record in all_records(conn, schema)? {
      if matched.contains_key(&record.id) {
        continue;
      }
      let texts = record
        .values
        .iter()
        .filter(|(name, _)| eligible.contains(&name.as_str()))
        .filter_map(|(_, value)| value.as_text());
      if variants.matches_initials(texts) {
        matched.insert(record.id, record);
      }
    }
  }

  Ok(matched.into_values().collect())
}

fn index(
  conn: &Connection,
  schema: &Schema,
  variants: &KeywordVariants,
) -> rusqlite::Result<Vec<Record>> {
  like_matches(conn, schema, variants, variants.initials_query)
}

/// `LIKE` every variant against every source column and, with
/// `with_shadows`, the initials needle against every shadow column.
fn like_matches(
  conn: &Connection,
  schema: &Schema,
  variants: &KeywordVariants,
  with_shadows: bool,
) -> rusqlite::Result<Vec<Record>> {
  let mut patterns = variants.like_patterns();
  let mut clauses = Vec::new();
  for col in schema.columns() {
    for i in 1..=patterns.len() {
      clauses.push(format!("{} LIKE ?{i} ESCAPE '\\'", quote(&col.name)));
    }
  }

  if with_shadows {
    patterns.push(like_pattern(&variants.initials_needle()));
    let n = patterns.len();
    for col in schema.derived_columns() {
      clauses.push(format!("{} LIKE ?{n} ESCAPE '\\'", quote(&col.shadow_name())));
    }
  }

  if clauses.is_empty() {
    return Ok(Vec::new());
  }

  let sql = format!(
    "{} WHERE {} ORDER BY {}",
    select_records_sql(schema),
    clauses.join(" OR "),
    quote(ID_COLUMN)
  );
  let mut stmt = conn.prepare(&sql)?;
  let records = stmt
    .query_map(params_from_iter(patterns.iter()), |row| decode_record(row, schema))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(records)
}
