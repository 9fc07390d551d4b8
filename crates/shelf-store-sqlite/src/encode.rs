//! Encoding and decoding between Shelf domain types and their SQLite
//! representations.
//!
//! Values map one-to-one onto SQLite storage classes. The schema is persisted
//! as key/value pairs in the `catalog` table and rebuilt from those pairs plus
//! `PRAGMA table_info`.

use std::collections::HashMap;

use rusqlite::{
  Row,
  types::{Value as SqlValue, ValueRef},
};
use shelf_core::{
  record::{Record, RecordId, Value},
  schema::{ColumnDefinition, DeclaredType, ID_COLUMN, Schema},
};

// ─── Values ──────────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Integer(n) => SqlValue::Integer(*n),
    Value::Real(n) => SqlValue::Real(*n),
    Value::Text(s) => SqlValue::Text(s.clone()),
    Value::Binary(b) => SqlValue::Blob(b.clone()),
  }
}

pub fn decode_value(raw: ValueRef<'_>) -> Value {
  match raw {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(n) => Value::Integer(n),
    ValueRef::Real(n) => Value::Real(n),
    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::Binary(b.to_vec()),
  }
}

/// Read a row produced by
/// [`select_records_sql`](crate::schema::select_records_sql).
pub fn decode_record(row: &Row<'_>, schema: &Schema) -> rusqlite::Result<Record> {
  let id: i64 = row.get(0)?;
  let values = schema
    .columns()
    .iter()
    .enumerate()
    .map(|(i, col)| Ok((col.name.clone(), decode_value(row.get_ref(i + 1)?))))
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(Record { id: RecordId(id), values })
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

pub const DERIVED_ENABLED_KEY: &str = "derived_index_enabled";
const UNIQUE_KEY: &str = "unique_column";
const REQUIRED_KEY: &str = "required_column";

fn label_key(name: &str) -> String { format!("col_{name}_label") }

fn type_key(name: &str) -> String { format!("col_{name}_type") }

fn derived_key(name: &str) -> String { format!("derived_index_{name}") }

/// Catalog rows describing `schema`.
pub fn encode_catalog(schema: &Schema) -> Vec<(String, String)> {
  let mut entries = Vec::new();
  for col in schema.columns() {
    entries.push((label_key(&col.name), col.label.clone()));
    entries.push((type_key(&col.name), col.declared_type.as_str().to_owned()));
    if col.is_derived_eligible() {
      entries.push((derived_key(&col.name), "1".to_owned()));
    }
  }

  let joined = |pred: fn(&ColumnDefinition) -> bool| {
    schema
      .columns()
      .iter()
      .filter(|c| pred(c))
      .map(|c| c.name.as_str())
      .collect::<Vec<_>>()
      .join(",")
  };
  let unique = joined(|c| c.unique);
  if !unique.is_empty() {
    entries.push((UNIQUE_KEY.to_owned(), unique));
  }
  let required = joined(|c| c.required);
  if !required.is_empty() {
    entries.push((REQUIRED_KEY.to_owned(), required));
  }

  entries
}

/// Rebuild column definitions from catalog rows and the physical
/// `(name, sql type)` list of the records table.
///
/// Physical columns without a label entry (the identity column and shadow
/// columns) are skipped; order follows the physical table, which is
/// definition order.
pub fn decode_catalog(
  entries: &HashMap<String, String>,
  table_columns: &[(String, String)],
) -> Vec<ColumnDefinition> {
  let listed = |key: &str, name: &str| {
    entries
      .get(key)
      .is_some_and(|v| v.split(',').any(|n| n == name))
  };

  table_columns
    .iter()
    .filter(|(name, _)| name != ID_COLUMN)
    .filter_map(|(name, sql_type)| {
      let label = entries.get(&label_key(name))?;
      let declared_type = entries
        .get(&type_key(name))
        .and_then(|t| t.parse().ok())
        .unwrap_or_else(|| DeclaredType::from_storage(sql_type));
      Some(ColumnDefinition {
        name: name.clone(),
        label: label.clone(),
        declared_type,
        required: listed(REQUIRED_KEY, name),
        unique: listed(UNIQUE_KEY, name),
        derived_index: entries.get(&derived_key(name)).is_some_and(|v| v == "1"),
      })
    })
    .collect()
}

pub fn decode_flag(value: Option<&String>) -> bool { value.is_some_and(|v| v == "1") }
