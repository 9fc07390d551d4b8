//! SQL schema for the Shelf SQLite store.
//!
//! Two tables: `catalog` holds the persisted schema description as key/value
//! pairs, and `records` holds one row per record, shaped by the runtime
//! schema. `records` is dropped and recreated on every `define`.

use shelf_core::schema::{ID_COLUMN, Schema};

pub const RECORDS_TABLE: &str = "records";

/// Connection-level pragmas, run once per connection outside any
/// transaction.
pub const PRAGMAS: &str = "PRAGMA journal_mode = WAL;";

/// Catalog DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const CATALOG: &str = "
CREATE TABLE IF NOT EXISTS catalog (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);
";

/// Drops both tables ahead of a rebuild. The `sqlite_sequence` row of
/// `records` goes with it, so identities restart at 1.
pub const DROP_ALL: &str = "
DROP TABLE IF EXISTS records;
DROP TABLE IF EXISTS catalog;
";

/// Quote an identifier for interpolation into SQL.
///
/// Column names are validated as plain identifiers by
/// [`Schema::new`](shelf_core::schema::Schema::new); quoting keeps keywords
/// such as `order` usable as column names.
pub fn quote(ident: &str) -> String { format!("\"{}\"", ident.replace('"', "\"\"")) }

/// `CREATE TABLE records (...)` for `schema`.
///
/// `AUTOINCREMENT` guarantees identities are never handed out twice, even
/// after the highest record is deleted.
pub fn create_records_sql(schema: &Schema) -> String {
  let mut cols = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(ID_COLUMN))];
  cols.extend(
    schema
      .columns()
      .iter()
      .map(|c| format!("{} {}", quote(&c.name), c.declared_type.storage_type())),
  );
  format!("CREATE TABLE {RECORDS_TABLE} (\n    {}\n)", cols.join(",\n    "))
}

/// `SELECT record_id, <user columns> FROM records`. Shadow columns are never
/// selected.
pub fn select_records_sql(schema: &Schema) -> String {
  let cols: Vec<String> = std::iter::once(quote(ID_COLUMN))
    .chain(schema.columns().iter().map(|c| quote(&c.name)))
    .collect();
  format!("SELECT {} FROM {RECORDS_TABLE}", cols.join(", "))
}
