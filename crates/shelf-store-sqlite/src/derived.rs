//! Derived Index Maintainer.
//!
//! Shadow columns (`<name>_derived`) hold the pinyin initials key of their
//! source column. They are added lazily, the first time the record count
//! exceeds the configured threshold, and backfilled at that moment. The
//! transition is one-way until the next `define`.
//!
//! Everything here runs on the connection thread inside a single
//! `tokio_rusqlite` call, under the store's write lock.

use std::collections::HashSet;

use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use serde::Serialize;
use shelf_core::{
  phonetic,
  record::{Fields, Value},
  schema::{ColumnDefinition, ID_COLUMN, Schema},
};
use tracing::{info, warn};

use crate::{
  encode::{DERIVED_ENABLED_KEY, decode_value},
  schema::{RECORDS_TABLE, quote},
};

/// Outcome of the one-time backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
  pub updated: usize,
  pub failed:  usize,
}

/// Physical column names of the records table.
pub(crate) fn table_columns(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({RECORDS_TABLE})"))?;
  let cols = stmt
    .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(cols)
}

pub(crate) fn record_count(conn: &Connection) -> rusqlite::Result<usize> {
  let n: i64 =
    conn.query_row(&format!("SELECT COUNT(*) FROM {RECORDS_TABLE}"), [], |r| r.get(0))?;
  Ok(n as usize)
}

/// Enable derived indexing if the store has grown past `threshold`.
///
/// Returns `None` when the threshold has not been crossed.
pub(crate) fn enable_if_due(
  conn: &mut Connection,
  schema: &Schema,
  threshold: usize,
) -> rusqlite::Result<Option<BackfillReport>> {
  let count = record_count(conn)?;
  if count <= threshold {
    return Ok(None);
  }
  info!(count, threshold, "record count crossed threshold, enabling derived index");
  enable(conn, schema).map(Some)
}

/// Add missing shadow columns, mark the store enabled and backfill every
/// record.
///
/// A record whose backfill fails is logged and skipped; every record that
/// was updated has all of its shadow values consistent with its source
/// values.
pub(crate) fn enable(conn: &mut Connection, schema: &Schema) -> rusqlite::Result<BackfillReport> {
  let tx = conn.transaction()?;

  let existing: HashSet<String> = table_columns(&tx)?.into_iter().map(|(n, _)| n).collect();
  for col in schema.derived_columns() {
    let shadow = col.shadow_name();
    if !existing.contains(&shadow) {
      tx.execute_batch(&format!(
        "ALTER TABLE {RECORDS_TABLE} ADD COLUMN {} TEXT NOT NULL DEFAULT ''",
        quote(&shadow)
      ))?;
    }
  }

  tx.execute(
    "INSERT OR REPLACE INTO catalog (key, value) VALUES (?1, '1')",
    [DERIVED_ENABLED_KEY],
  )?;

  let report = backfill(&tx, schema)?;
  tx.commit()?;

  info!(updated = report.updated, failed = report.failed, "derived index backfill finished");
  Ok(report)
}

fn backfill(conn: &Connection, schema: &Schema) -> rusqlite::Result<BackfillReport> {
  let cols: Vec<&ColumnDefinition> = schema.derived_columns().collect();
  let mut report = BackfillReport::default();
  if cols.is_empty() {
    return Ok(report);
  }

  let sources: Vec<String> = cols.iter().map(|c| quote(&c.name)).collect();
  let select = format!(
    "SELECT {}, {} FROM {RECORDS_TABLE}",
    quote(ID_COLUMN),
    sources.join(", ")
  );
  let rows: Vec<(i64, Vec<Value>)> = {
    let mut stmt = conn.prepare(&select)?;
    stmt
      .query_map([], |row| {
        let values = (0..cols.len())
          .map(|i| Ok(decode_value(row.get_ref(i + 1)?)))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((row.get(0)?, values))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  let assignments: Vec<String> = cols
    .iter()
    .enumerate()
    .map(|(i, c)| format!("{} = ?{}", quote(&c.shadow_name()), i + 1))
    .collect();
  let update = format!(
    "UPDATE {RECORDS_TABLE} SET {} WHERE {} = ?{}",
    assignments.join(", "),
    quote(ID_COLUMN),
    cols.len() + 1
  );
  let mut stmt = conn.prepare(&update)?;

  for (id, values) in rows {
    let params = values
      .iter()
      .map(|v| SqlValue::Text(phonetic::value_key(v)))
      .chain(std::iter::once(SqlValue::Integer(id)));
    match stmt.execute(params_from_iter(params)) {
      Ok(_) => report.updated += 1,
      Err(err) => {
        warn!(record_id = id, error = %err, "derived index backfill failed for record");
        report.failed += 1;
      }
    }
  }

  Ok(report)
}

/// Shadow values for the eligible columns present in `fields`, as
/// `(shadow column, key)` pairs.
pub(crate) fn shadow_values(schema: &Schema, fields: &Fields) -> Vec<(String, String)> {
  schema
    .derived_columns()
    .filter_map(|col| {
      let value = fields.get(&col.name)?;
      Some((col.shadow_name(), phonetic::value_key(value)))
    })
    .collect()
}
