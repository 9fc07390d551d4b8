//! [`SqliteStore`]: the SQLite implementation of [`RecordStore`].

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
};

use rusqlite::{Connection, OptionalExtension as _, params_from_iter, types::Value as SqlValue};
use shelf_core::{
  ConstraintViolation, ViolationReason,
  backup::BackupKind,
  record::{Fields, Record, RecordId},
  schema::{ColumnDefinition, ID_COLUMN, Schema, WriteMode},
  search::KeywordVariants,
  store::RecordStore,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::StoreConfig,
  derived::{enable_if_due, record_count, shadow_values, table_columns},
  encode::{DERIVED_ENABLED_KEY, decode_catalog, decode_flag, decode_record, encode_catalog, encode_value},
  schema::{CATALOG, DROP_ALL, PRAGMAS, RECORDS_TABLE, create_records_sql, quote, select_records_sql},
  search,
};

/// Validation outcome carried out of a connection call.
type Checked<T> = std::result::Result<T, shelf_core::Error>;

// ─── Location ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Location {
  Memory,
  File(PathBuf),
}

impl Location {
  /// Identifier embedded in artifact names: the store file's stem.
  pub(crate) fn store_id(&self) -> String {
    match self {
      Self::Memory => "memory".to_owned(),
      Self::File(path) => path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_owned()),
    }
  }

  pub(crate) fn path(&self) -> Option<&Path> {
    match self {
      Self::Memory => None,
      Self::File(path) => Some(path),
    }
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Everything guarded by the store lock.
pub(crate) struct State {
  pub(crate) conn:            tokio_rusqlite::Connection,
  pub(crate) schema:          Option<Schema>,
  pub(crate) derived_enabled: bool,
}

impl State {
  /// Open a connection and load the persisted schema, enabling derived
  /// indexing if the store has already outgrown `threshold`.
  pub(crate) async fn open(location: &Location, threshold: usize) -> Result<Self> {
    let conn = match location {
      Location::Memory => tokio_rusqlite::Connection::open_in_memory().await?,
      Location::File(path) => tokio_rusqlite::Connection::open(path).await?,
    };

    let (schema, derived_enabled) = conn
      .call(move |conn| {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(CATALOG)?;
        load_schema(conn, threshold)
      })
      .await?;

    Ok(Self { conn, schema, derived_enabled })
  }
}

pub(crate) struct Inner {
  pub(crate) state:    RwLock<State>,
  pub(crate) config:   StoreConfig,
  pub(crate) location: Location,
  pub(crate) timer:    Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
  pub(crate) fn stop_timer(&self) {
    if let Some(handle) = self.timer.lock().ok().and_then(|mut t| t.take()) {
      handle.abort();
    }
  }
}

impl Drop for Inner {
  fn drop(&mut self) { self.stop_timer(); }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Shelf record store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and the lock.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) inner: Arc<Inner>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default settings.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_config(path, StoreConfig::default()).await
  }

  pub async fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
    Self::start(Location::File(path.as_ref().to_path_buf()), config).await
  }

  /// Open an in-memory store. Backups need `config.backup.dir`.
  pub async fn open_in_memory(config: StoreConfig) -> Result<Self> {
    Self::start(Location::Memory, config).await
  }

  async fn start(location: Location, config: StoreConfig) -> Result<Self> {
    let state = State::open(&location, config.derived_index_threshold).await?;
    info!(
      store = %location.store_id(),
      defined = state.schema.is_some(),
      derived_enabled = state.derived_enabled,
      "store opened"
    );

    let store = Self {
      inner: Arc::new(Inner {
        state: RwLock::new(state),
        config,
        location,
        timer: Mutex::new(None),
      }),
    };

    if store.inner.config.backup.on_open && store.backup_dir().is_some() {
      if let Err(err) = store.snapshot(BackupKind::Auto).await {
        warn!(error = %err, "backup on open failed");
      }
    }
    if store.inner.config.backup.auto && store.backup_dir().is_some() {
      store.start_timer();
    }

    Ok(store)
  }

  /// Stop the backup timer, take the closing backup and close the
  /// connection. Other clones of this store fail with a database error
  /// afterwards.
  pub async fn close(self) -> Result<()> {
    self.inner.stop_timer();
    let state = self.inner.state.write().await;
    if self.inner.config.backup.on_close && self.backup_dir().is_some() {
      if let Err(err) = self.snapshot_locked(&state, BackupKind::Auto).await {
        warn!(error = %err, "backup on close failed");
      }
    }
    state.conn.clone().close().await?;
    Ok(())
  }

  pub fn config(&self) -> &StoreConfig { &self.inner.config }

  /// The store file, or `None` for an in-memory store.
  pub fn path(&self) -> Option<&Path> { self.inner.location.path() }

  /// Whether derived shadow columns exist and are maintained.
  pub async fn derived_index_enabled(&self) -> bool {
    self.inner.state.read().await.derived_enabled
  }
}

// ─── Connection-side helpers ─────────────────────────────────────────────────

fn read_catalog(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
  let mut stmt = conn.prepare("SELECT key, value FROM catalog")?;
  let entries = stmt
    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
    .collect::<rusqlite::Result<HashMap<_, _>>>()?;
  Ok(entries)
}

fn describe_columns(conn: &Connection) -> rusqlite::Result<Vec<ColumnDefinition>> {
  let catalog = read_catalog(conn)?;
  Ok(decode_catalog(&catalog, &table_columns(conn)?))
}

/// The persisted schema (if any) and the derived flag, enabling derived
/// indexing first if it is due.
fn load_schema(
  conn: &mut Connection,
  threshold: usize,
) -> tokio_rusqlite::Result<(Option<Schema>, bool)> {
  let catalog = read_catalog(conn)?;
  let columns = decode_catalog(&catalog, &table_columns(conn)?);
  let enabled = decode_flag(catalog.get(DERIVED_ENABLED_KEY));
  if columns.is_empty() {
    return Ok((None, enabled));
  }
  let schema =
    Schema::new(columns).map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
  if enabled {
    return Ok((Some(schema), true));
  }

  let enabled = match enable_if_due(conn, &schema, threshold) {
    Ok(report) => report.is_some(),
    Err(err) => {
      warn!(error = %err, "enabling derived index on open failed");
      false
    }
  };
  Ok((Some(schema), enabled))
}

fn rebuild(conn: &mut Connection, create: &str, entries: &[(String, String)]) -> rusqlite::Result<()> {
  let tx = conn.transaction()?;
  tx.execute_batch(DROP_ALL)?;
  tx.execute_batch(CATALOG)?;
  tx.execute_batch(create)?;
  {
    let mut stmt = tx.prepare("INSERT INTO catalog (key, value) VALUES (?1, ?2)")?;
    for (key, value) in entries {
      stmt.execute(rusqlite::params![key, value])?;
    }
  }
  tx.commit()
}

/// First unique column whose value is already held by another record.
fn unique_violation(
  conn: &Connection,
  schema: &Schema,
  fields: &Fields,
  exclude: Option<i64>,
) -> rusqlite::Result<Option<ConstraintViolation>> {
  for col in schema.unique_columns() {
    let Some(value) = fields.get(&col.name) else { continue };
    if value.is_empty() {
      continue;
    }
    let clashes: i64 = conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM {RECORDS_TABLE} WHERE {} = ?1 AND {} != ?2",
        quote(&col.name),
        quote(ID_COLUMN)
      ),
      rusqlite::params![encode_value(value), exclude.unwrap_or(0)],
      |r| r.get(0),
    )?;
    if clashes > 0 {
      return Ok(Some(ConstraintViolation::new(&col.name, ViolationReason::Unique)));
    }
  }
  Ok(None)
}

/// Column names and bound values for a write, shadows included.
fn write_columns(fields: &Fields, shadows: Vec<(String, String)>) -> (Vec<String>, Vec<SqlValue>) {
  let mut names = Vec::with_capacity(fields.len() + shadows.len());
  let mut values = Vec::with_capacity(fields.len() + shadows.len());
  for (name, value) in fields {
    names.push(quote(name));
    values.push(encode_value(value));
  }
  for (name, key) in shadows {
    names.push(quote(&name));
    values.push(SqlValue::Text(key));
  }
  (names, values)
}

fn insert_record(
  conn: &mut Connection,
  schema: &Schema,
  fields: Fields,
  derived_enabled: bool,
  threshold: usize,
) -> rusqlite::Result<Checked<(i64, bool)>> {
  let fields = match schema.prepare_write(fields, WriteMode::Insert) {
    Ok(fields) => fields,
    Err(err) => return Ok(Err(err)),
  };
  if let Some(violation) = unique_violation(conn, schema, &fields, None)? {
    return Ok(Err(violation.into()));
  }

  let shadows = if derived_enabled { shadow_values(schema, &fields) } else { Vec::new() };
  let (names, values) = write_columns(&fields, shadows);
  if names.is_empty() {
    conn.execute(&format!("INSERT INTO {RECORDS_TABLE} DEFAULT VALUES"), [])?;
  } else {
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    conn.execute(
      &format!(
        "INSERT INTO {RECORDS_TABLE} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
      ),
      params_from_iter(values),
    )?;
  }
  let id = conn.last_insert_rowid();

  let mut enabled = derived_enabled;
  if !enabled {
    match enable_if_due(conn, schema, threshold) {
      Ok(report) => enabled = report.is_some(),
      Err(err) => warn!(error = %err, "enabling derived index failed; will retry on next insert"),
    }
  }
  Ok(Ok((id, enabled)))
}

fn update_record(
  conn: &Connection,
  schema: &Schema,
  id: i64,
  fields: Fields,
  derived_enabled: bool,
) -> rusqlite::Result<Checked<bool>> {
  let exists = conn
    .query_row(
      &format!("SELECT 1 FROM {RECORDS_TABLE} WHERE {} = ?1", quote(ID_COLUMN)),
      [id],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if !exists {
    return Ok(Ok(false));
  }

  let fields = match schema.prepare_write(fields, WriteMode::Update) {
    Ok(fields) => fields,
    Err(err) => return Ok(Err(err)),
  };
  if let Some(violation) = unique_violation(conn, schema, &fields, Some(id))? {
    return Ok(Err(violation.into()));
  }
  if fields.is_empty() {
    return Ok(Ok(true));
  }

  let shadows = if derived_enabled { shadow_values(schema, &fields) } else { Vec::new() };
  let (names, mut values) = write_columns(&fields, shadows);
  let assignments: Vec<String> = names
    .iter()
    .enumerate()
    .map(|(i, name)| format!("{name} = ?{}", i + 1))
    .collect();
  let id_param = values.len() + 1;
  values.push(SqlValue::Integer(id));
  conn.execute(
    &format!(
      "UPDATE {RECORDS_TABLE} SET {} WHERE {} = ?{id_param}",
      assignments.join(", "),
      quote(ID_COLUMN)
    ),
    params_from_iter(values),
  )?;
  Ok(Ok(true))
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Schema catalog ────────────────────────────────────────────────────────

  async fn define(&self, columns: Vec<ColumnDefinition>) -> Result<()> {
    let schema = Schema::new(columns)?;
    let create = create_records_sql(&schema);
    let entries = encode_catalog(&schema);

    let mut state = self.inner.state.write().await;
    state
      .conn
      .call(move |conn| Ok(rebuild(conn, &create, &entries)?))
      .await?;

    info!(columns = schema.columns().len(), "schema defined, records discarded");
    state.schema = Some(schema);
    state.derived_enabled = false;
    Ok(())
  }

  async fn describe(&self) -> Result<Vec<ColumnDefinition>> {
    let state = self.inner.state.read().await;
    let columns = state.conn.call(|conn| Ok(describe_columns(conn)?)).await?;
    Ok(columns)
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn insert(&self, fields: Fields) -> Result<RecordId> {
    let mut state = self.inner.state.write().await;
    let schema = state.schema.clone().ok_or(Error::NoSchema)?;
    let derived_enabled = state.derived_enabled;
    let threshold = self.inner.config.derived_index_threshold;

    let (id, enabled) = state
      .conn
      .call(move |conn| Ok(insert_record(conn, &schema, fields, derived_enabled, threshold)?))
      .await??;

    state.derived_enabled = enabled;
    debug!(record_id = id, "record inserted");
    Ok(RecordId(id))
  }

  async fn update(&self, id: RecordId, fields: Fields) -> Result<bool> {
    let state = self.inner.state.write().await;
    let schema = state.schema.clone().ok_or(Error::NoSchema)?;
    let derived_enabled = state.derived_enabled;

    let updated = state
      .conn
      .call(move |conn| Ok(update_record(conn, &schema, id.0, fields, derived_enabled)?))
      .await??;

    debug!(record_id = id.0, updated, "record update");
    Ok(updated)
  }

  async fn delete(&self, id: RecordId) -> Result<bool> {
    let state = self.inner.state.write().await;
    if state.schema.is_none() {
      return Ok(false);
    }

    let removed = state
      .conn
      .call(move |conn| {
        let n = conn.execute(
          &format!("DELETE FROM {RECORDS_TABLE} WHERE {} = ?1", quote(ID_COLUMN)),
          [id.0],
        )?;
        Ok(n > 0)
      })
      .await?;

    debug!(record_id = id.0, removed, "record delete");
    Ok(removed)
  }

  async fn get(&self, id: RecordId) -> Result<Option<Record>> {
    let state = self.inner.state.read().await;
    let Some(schema) = state.schema.clone() else { return Ok(None) };

    let record = state
      .conn
      .call(move |conn| {
        let sql = format!("{} WHERE {} = ?1", select_records_sql(&schema), quote(ID_COLUMN));
        let record = conn
          .query_row(&sql, [id.0], |row| decode_record(row, &schema))
          .optional()?;
        Ok(record)
      })
      .await?;
    Ok(record)
  }

  async fn list_all(&self) -> Result<Vec<Record>> {
    let state = self.inner.state.read().await;
    let Some(schema) = state.schema.clone() else { return Ok(Vec::new()) };

    let records = state
      .conn
      .call(move |conn| Ok(search::all_records(conn, &schema)?))
      .await?;
    Ok(records)
  }

  async fn count(&self) -> Result<usize> {
    let state = self.inner.state.read().await;
    if state.schema.is_none() {
      return Ok(0);
    }
    let n = state.conn.call(|conn| Ok(record_count(conn)?)).await?;
    Ok(n)
  }

  // ── Search ────────────────────────────────────────────────────────────────

  async fn search<'a>(&'a self, keyword: &'a str) -> Result<Vec<Record>> {
    let state = self.inner.state.read().await;
    let Some(schema) = state.schema.clone() else { return Ok(Vec::new()) };
    if schema.columns().is_empty() {
      return Ok(Vec::new());
    }

    let variants = KeywordVariants::analyze(keyword);
    let small_threshold = self.inner.config.small_search_threshold;
    let derived_enabled = state.derived_enabled;

    let records = state
      .conn
      .call(move |conn| {
        Ok(search::run(conn, &schema, &variants, small_threshold, derived_enabled)?)
      })
      .await?;
    Ok(records)
  }
}
