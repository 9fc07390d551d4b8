//! `shelf`: command-line access to a Shelf record store.
//!
//! # Usage
//!
//! ```
//! shelf define '[{"name":"sku","unique":true,"required":true},{"name":"name"}]'
//! shelf insert '{"sku":"A1","name":"张三"}'
//! shelf search zs
//! shelf import items.json
//! shelf backup && shelf backups
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod settings;

use std::{
  io::{self, Write as _},
  path::PathBuf,
};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shelf_core::{
  backup::BackupKind,
  record::{Fields, RecordId},
  schema::{Schema, column_name_for},
  store::{RecordStore, SnapshotStore},
};
use shelf_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "shelf", version, about = "Per-tenant record store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "shelf.toml")]
  config: PathBuf,

  /// Store file; overrides `store_path` from the configuration.
  #[arg(short, long)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Replace the schema with a JSON array of column definitions. Discards
  /// every record.
  Define {
    /// Inline JSON; read from `--file` when omitted.
    json: Option<String>,
    #[arg(short, long, conflicts_with = "json")]
    file: Option<PathBuf>,
  },
  /// Print the active schema.
  Describe,
  /// Replace the schema with one inferred from a JSON array of objects, then
  /// insert every object as a record. Discards existing records.
  Import { file: PathBuf },
  /// Insert a record given as a JSON object.
  Insert { json: String },
  /// Overwrite fields of a record.
  Update { id: i64, json: String },
  Delete { id: i64 },
  Get { id: i64 },
  /// Print every record.
  List,
  Count,
  /// Keyword search, including pinyin and pinyin-initials matches.
  Search {
    #[arg(default_value = "")]
    keyword: String,
  },
  /// Take a backup now.
  Backup {
    #[arg(long, default_value = "manual")]
    kind: BackupKind,
  },
  /// List this store's backups, newest first.
  Backups,
  /// Replace the store with a backup artifact.
  Restore { artifact: PathBuf },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut settings = settings::load(&cli.config)?;
  // One-shot process; the interval timer would never fire.
  settings.store.backup.auto = false;
  let store_path = cli.store.unwrap_or(settings.store_path);

  let store = SqliteStore::open_with_config(&store_path, settings.store)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let outcome = run(&store, cli.command).await;
  store.close().await.context("failed to close store")?;
  outcome
}

async fn run(store: &SqliteStore, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Define { json, file } => {
      let raw = match (json, file) {
        (Some(json), _) => json,
        (None, Some(path)) => std::fs::read_to_string(&path)
          .with_context(|| format!("reading schema file {}", path.display()))?,
        (None, None) => bail!("define needs inline JSON or --file"),
      };
      let schema = Schema::from_json(&raw).context("invalid schema")?;
      store.define(schema.into_columns()).await?;
      print_json(&store.describe().await?)
    }
    Command::Describe => print_json(&store.describe().await?),
    Command::Import { file } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading import file {}", file.display()))?;
      let rows: Vec<Fields> = serde_json::from_str(&raw)
        .context("import data must be a JSON array of objects with scalar values")?;
      let imported = import_rows(store, rows).await?;
      print_json(&serde_json::json!({
        "imported": imported,
        "columns":  store.describe().await?,
      }))
    }
    Command::Insert { json } => {
      let id = store.insert(parse_fields(&json)?).await?;
      print_json(&serde_json::json!({ "record_id": id }))
    }
    Command::Update { id, json } => {
      let updated = store.update(RecordId(id), parse_fields(&json)?).await?;
      print_json(&serde_json::json!({ "updated": updated }))
    }
    Command::Delete { id } => {
      let deleted = store.delete(RecordId(id)).await?;
      print_json(&serde_json::json!({ "deleted": deleted }))
    }
    Command::Get { id } => print_json(&store.get(RecordId(id)).await?),
    Command::List => print_json(&store.list_all().await?),
    Command::Count => print_json(&store.count().await?),
    Command::Search { keyword } => print_json(&store.search(&keyword).await?),
    Command::Backup { kind } => {
      let path = store.backup(kind).await?;
      print_json(&serde_json::json!({ "path": path }))
    }
    Command::Backups => print_json(&store.list_backups().await?),
    Command::Restore { artifact } => {
      store.restore(&artifact).await?;
      print_json(&serde_json::json!({ "restored": artifact }))
    }
  }
}

/// Define a schema inferred from `rows` and insert them. Stops at the first
/// rejected row; rows before it stay inserted.
async fn import_rows(store: &SqliteStore, rows: Vec<Fields>) -> anyhow::Result<usize> {
  let schema = Schema::infer(&rows).context("cannot infer columns from the import data")?;
  store.define(schema.into_columns()).await?;

  let total = rows.len();
  for (n, row) in rows.into_iter().enumerate() {
    let row: Fields = row.into_iter().map(|(key, value)| (column_name_for(&key), value)).collect();
    store
      .insert(row)
      .await
      .with_context(|| format!("row {} of {total} rejected", n + 1))?;
  }
  Ok(total)
}

fn parse_fields(json: &str) -> anyhow::Result<Fields> {
  serde_json::from_str(json).context("fields must be a JSON object of column values")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  let mut stdout = io::stdout().lock();
  serde_json::to_writer_pretty(&mut stdout, value)?;
  writeln!(stdout)?;
  Ok(())
}
