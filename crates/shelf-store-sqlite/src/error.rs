//! Error types for `shelf-store-sqlite`.

use std::path::PathBuf;

use shelf_core::{ConstraintViolation, SchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(shelf_core::Error),

  #[error("schema error: {0}")]
  Schema(#[from] SchemaError),

  #[error(transparent)]
  Constraint(#[from] ConstraintViolation),

  #[error("unknown column: {0:?}")]
  UnknownColumn(String),

  /// A record operation was attempted before any schema was defined.
  #[error("no schema has been defined for this store")]
  NoSchema,

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("unknown tenant: {0:?}")]
  UnknownTenant(String),

  #[error("tenant catalog error: {0}")]
  Catalog(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Backup(#[from] BackupError),

  #[error(transparent)]
  Restore(#[from] RestoreError),
}

impl From<shelf_core::Error> for Error {
  fn from(err: shelf_core::Error) -> Self {
    match err {
      shelf_core::Error::Schema(e) => Self::Schema(e),
      shelf_core::Error::Constraint(v) => Self::Constraint(v),
      shelf_core::Error::UnknownColumn(c) => Self::UnknownColumn(c),
      other => Self::Core(other),
    }
  }
}

/// Failure while writing a snapshot.
#[derive(Debug, Error)]
pub enum BackupError {
  /// In-memory store without a configured backup directory.
  #[error("backups are unavailable for this store")]
  Unavailable,

  #[error("backup i/o error at {path:?}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("snapshot failed: {0}")]
  Snapshot(String),
}

/// Failure while restoring a snapshot.
#[derive(Debug, Error)]
pub enum RestoreError {
  /// The artifact is missing or is not a store. The live store is untouched.
  #[error("invalid backup artifact {path:?}: {reason}")]
  InvalidArtifact { path: PathBuf, reason: String },

  /// Staging the artifact next to the live store failed. The live store is
  /// untouched.
  #[error("failed to stage artifact at {path:?}: {source}")]
  Staging {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The rollback snapshot could not be taken, so nothing was replaced.
  #[error("safety backup failed, restore aborted: {0}")]
  SafetyBackup(#[source] BackupError),

  /// Replacement failed after the live store was closed. Its state is
  /// unspecified; recover manually from `rollback`.
  #[error("restore failed partway ({reason}); recover from {rollback:?}")]
  Partial { rollback: PathBuf, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
