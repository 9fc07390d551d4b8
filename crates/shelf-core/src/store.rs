//! The `RecordStore` and `SnapshotStore` traits.
//!
//! Implemented by storage backends (e.g. `shelf-store-sqlite`). Higher layers
//! (the `shelf` CLI, tenant bootstrapping) depend on these abstractions, not
//! on any concrete backend.
//!
//! Implementations must serialise writes against each other and against
//! snapshots; reads may run concurrently with other reads.

use std::{
  future::Future,
  path::{Path, PathBuf},
};

use crate::{
  backup::{ArtifactInfo, BackupKind},
  record::{Fields, Record, RecordId},
  schema::ColumnDefinition,
};

/// Schema, CRUD and search over one tenant's records.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Schema catalog ────────────────────────────────────────────────────

  /// Destructively rebuild the record table for `columns`. All existing
  /// records are discarded.
  fn define(
    &self,
    columns: Vec<ColumnDefinition>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Reconstruct the active schema from persisted metadata. Empty if no
  /// schema has been defined.
  fn describe(
    &self,
  ) -> impl Future<Output = Result<Vec<ColumnDefinition>, Self::Error>> + Send + '_;

  // ── Records ───────────────────────────────────────────────────────────

  /// Validate and persist a new record, returning its identity.
  fn insert(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<RecordId, Self::Error>> + Send + '_;

  /// Overwrite the given fields of record `id`. Returns `false` if `id`
  /// does not exist.
  fn update(
    &self,
    id: RecordId,
    fields: Fields,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns `false` if `id` does not exist.
  fn delete(
    &self,
    id: RecordId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get(
    &self,
    id: RecordId,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// Every record in storage order.
  fn list_all(&self) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  fn count(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Search ────────────────────────────────────────────────────────────

  /// Keyword search over every column, including pinyin and
  /// pinyin-initials matches. An empty keyword returns every record.
  fn search<'a>(
    &'a self,
    keyword: &'a str,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;
}

/// Point-in-time snapshots and rollback-safe restore.
pub trait SnapshotStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Write a consistent snapshot and apply retention. Returns the artifact
  /// path.
  fn backup(
    &self,
    kind: BackupKind,
  ) -> impl Future<Output = Result<PathBuf, Self::Error>> + Send + '_;

  /// Replace the live store with `artifact`, taking a `rollback` backup of
  /// the current state first.
  fn restore<'a>(
    &'a self,
    artifact: &'a Path,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// This store's artifacts, newest first.
  fn list_backups(
    &self,
  ) -> impl Future<Output = Result<Vec<ArtifactInfo>, Self::Error>> + Send + '_;
}
