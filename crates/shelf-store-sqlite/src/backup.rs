//! Backup, retention and restore.
//!
//! Artifacts are complete SQLite files written with the online backup API,
//! so a snapshot is consistent even while the WAL holds uncommitted pages.
//! Every snapshot is taken under the store's write lock.

use std::{
  io,
  path::{Path, PathBuf},
  sync::Arc,
  time::SystemTime,
};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use rusqlite::{DatabaseName, OpenFlags};
use shelf_core::{
  backup::{ArtifactInfo, BackupKind, artifact_file_name, parse_artifact_name, select_evictions},
  store::SnapshotStore,
};
use tokio::time::{Instant, interval_at};
use tracing::{error, info, warn};

use crate::{
  BackupError, Error, RestoreError, Result,
  store::{Location, SqliteStore, State},
};

/// Suffix of the staged copy that is renamed over the live file.
const STAGING_SUFFIX: &str = "restore-tmp";

impl SqliteStore {
  /// Where artifacts go: the configured directory, else `backups/` next to
  /// the store file. `None` for an in-memory store without a directory.
  pub fn backup_dir(&self) -> Option<PathBuf> {
    match (&self.inner.config.backup.dir, &self.inner.location) {
      (Some(dir), _) => Some(dir.clone()),
      (None, Location::File(path)) => Some(
        path
          .parent()
          .map(|p| p.join("backups"))
          .unwrap_or_else(|| PathBuf::from("backups")),
      ),
      (None, Location::Memory) => None,
    }
  }

  pub(crate) async fn snapshot(&self, kind: BackupKind) -> Result<PathBuf, BackupError> {
    let state = self.inner.state.write().await;
    self.snapshot_locked(&state, kind).await
  }

  /// Write an artifact of the current state and apply retention. The
  /// caller holds the write lock.
  pub(crate) async fn snapshot_locked(&self, state: &State, kind: BackupKind) -> Result<PathBuf, BackupError> {
    let dir = self.backup_dir().ok_or(BackupError::Unavailable)?;
    tokio::fs::create_dir_all(&dir)
      .await
      .map_err(|source| BackupError::Io { path: dir.clone(), source })?;

    let store_id = self.inner.location.store_id();
    let path = free_artifact_path(&dir, &store_id, kind, Local::now().naive_local()).await?;

    let target = path.clone();
    state
      .conn
      .call(move |conn| {
        conn.backup(DatabaseName::Main, &target, None)?;
        Ok(())
      })
      .await
      .map_err(|e| BackupError::Snapshot(e.to_string()))?;
    info!(path = %path.display(), %kind, "backup written");

    if let Err(err) = self.apply_retention(&dir, &store_id).await {
      warn!(error = %err, "backup retention failed");
    }
    Ok(path)
  }

  async fn apply_retention(&self, dir: &Path, store_id: &str) -> Result<(), BackupError> {
    let max = self.inner.config.backup.max_artifacts.max(1);
    let artifacts = scan_artifacts(dir, store_id)
      .await?
      .into_iter()
      .map(|(info, modified)| (info.path, modified))
      .collect();

    for path in select_evictions(artifacts, max) {
      tokio::fs::remove_file(&path)
        .await
        .map_err(|source| BackupError::Io { path: path.clone(), source })?;
      info!(path = %path.display(), "backup evicted");
    }
    Ok(())
  }

  /// Run `auto` snapshots on the configured interval until the store is
  /// dropped or closed.
  pub(crate) fn start_timer(&self) {
    let weak = Arc::downgrade(&self.inner);
    let period = self.inner.config.backup.interval();

    let handle = tokio::spawn(async move {
      let mut ticker = interval_at(Instant::now() + period, period);
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else { break };
        let store = SqliteStore { inner };
        if let Err(err) = store.snapshot(BackupKind::Auto).await {
          warn!(error = %err, "scheduled backup failed");
        }
      }
    });

    if let Ok(mut timer) = self.inner.timer.lock() {
      *timer = Some(handle);
    }
  }
}

// ─── Artifacts ───────────────────────────────────────────────────────────────

/// First unused artifact path for this second.
async fn free_artifact_path(
  dir: &Path,
  store_id: &str,
  kind: BackupKind,
  taken_at: NaiveDateTime,
) -> Result<PathBuf, BackupError> {
  let mut collision = 0;
  loop {
    let path = dir.join(artifact_file_name(store_id, kind, taken_at, collision));
    let taken = tokio::fs::try_exists(&path)
      .await
      .map_err(|source| BackupError::Io { path: path.clone(), source })?;
    if !taken {
      return Ok(path);
    }
    collision += 1;
  }
}

/// This store's artifacts in `dir`, with their modification times.
async fn scan_artifacts(
  dir: &Path,
  store_id: &str,
) -> Result<Vec<(ArtifactInfo, SystemTime)>, BackupError> {
  let io_err = |source| BackupError::Io { path: dir.to_path_buf(), source };

  let mut entries = match tokio::fs::read_dir(dir).await {
    Ok(entries) => entries,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(err) => return Err(io_err(err)),
  };

  let mut found = Vec::new();
  while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
    let name = entry.file_name();
    let Some((kind, _)) = parse_artifact_name(store_id, &name.to_string_lossy()) else {
      continue;
    };
    let meta = entry.metadata().await.map_err(io_err)?;
    if !meta.is_file() {
      continue;
    }
    let modified = meta.modified().map_err(io_err)?;
    let info = ArtifactInfo {
      path: entry.path(),
      kind,
      size: meta.len(),
      created_at: DateTime::<Utc>::from(modified),
    };
    found.push((info, modified));
  }
  Ok(found)
}

// ─── Restore ─────────────────────────────────────────────────────────────────

/// The artifact must be a readable SQLite file carrying a schema catalog.
async fn verify_artifact(path: &Path) -> Result<(), RestoreError> {
  let invalid = |reason: String| RestoreError::InvalidArtifact { path: path.to_path_buf(), reason };

  match tokio::fs::metadata(path).await {
    Ok(meta) if meta.is_file() => {}
    Ok(_) => return Err(invalid("not a regular file".to_owned())),
    Err(err) => return Err(invalid(err.to_string())),
  }

  let conn = tokio_rusqlite::Connection::open_with_flags(
    path,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )
  .await
  .map_err(|e| invalid(e.to_string()))?;

  let has_catalog = conn
    .call(|conn| {
      let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'catalog'",
        [],
        |r| r.get(0),
      )?;
      Ok(n > 0)
    })
    .await;
  if let Err(err) = conn.close().await {
    warn!(error = %err, "closing verification connection failed");
  }

  match has_catalog {
    Ok(true) => Ok(()),
    Ok(false) => Err(invalid("no schema catalog".to_owned())),
    Err(err) => Err(invalid(err.to_string())),
  }
}

/// Copy `artifact` next to the live file and flush it to disk.
async fn stage(artifact: &Path, staging: &Path) -> io::Result<()> {
  tokio::fs::copy(artifact, staging).await?;
  tokio::fs::File::open(staging).await?.sync_all().await
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
  match tokio::fs::remove_file(path).await {
    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
    _ => Ok(()),
  }
}

fn sidecar(live: &Path, suffix: &str) -> PathBuf {
  let mut name = live.as_os_str().to_owned();
  name.push(suffix);
  PathBuf::from(name)
}

/// Close the live connection, move the staged file over the live file and
/// reopen.
async fn swap(
  state: &mut State,
  location: &Location,
  live: &Path,
  staging: &Path,
  threshold: usize,
) -> Result<(), String> {
  state.conn.clone().close().await.map_err(|e| format!("closing live store: {e}"))?;

  for suffix in ["-wal", "-shm"] {
    let path = sidecar(live, suffix);
    remove_if_present(&path)
      .await
      .map_err(|e| format!("removing {}: {e}", path.display()))?;
  }
  tokio::fs::rename(staging, live)
    .await
    .map_err(|e| format!("replacing live store: {e}"))?;

  *state = State::open(location, threshold)
    .await
    .map_err(|e| format!("reopening restored store: {e}"))?;
  Ok(())
}

// ─── SnapshotStore impl ──────────────────────────────────────────────────────

impl SnapshotStore for SqliteStore {
  type Error = Error;

  async fn backup(&self, kind: BackupKind) -> Result<PathBuf> {
    Ok(self.snapshot(kind).await?)
  }

  async fn restore<'a>(&'a self, artifact: &'a Path) -> Result<()> {
    let location = &self.inner.location;
    let Location::File(live) = location else {
      return Err(BackupError::Unavailable.into());
    };
    let threshold = self.inner.config.derived_index_threshold;

    let mut state = self.inner.state.write().await;

    verify_artifact(artifact).await?;

    let staging = sidecar(live, &format!(".{STAGING_SUFFIX}"));
    if let Err(source) = stage(artifact, &staging).await {
      let _ = remove_if_present(&staging).await;
      return Err(RestoreError::Staging { path: staging, source }.into());
    }

    let rollback = match self.snapshot_locked(&state, BackupKind::Rollback).await {
      Ok(path) => path,
      Err(err) => {
        let _ = remove_if_present(&staging).await;
        return Err(RestoreError::SafetyBackup(err).into());
      }
    };

    if let Err(reason) = swap(&mut state, location, live, &staging, threshold).await {
      error!(%reason, rollback = %rollback.display(), "restore failed after closing the live store");
      let _ = remove_if_present(&staging).await;
      match State::open(location, threshold).await {
        Ok(reopened) => *state = reopened,
        Err(err) => error!(error = %err, "could not reattach the live store"),
      }
      return Err(RestoreError::Partial { rollback, reason }.into());
    }

    info!(
      artifact = %artifact.display(),
      rollback = %rollback.display(),
      "store restored"
    );
    Ok(())
  }

  async fn list_backups(&self) -> Result<Vec<ArtifactInfo>> {
    let Some(dir) = self.backup_dir() else { return Ok(Vec::new()) };
    let mut artifacts = scan_artifacts(&dir, &self.inner.location.store_id()).await?;
    artifacts.sort_by(|(a, ta), (b, tb)| tb.cmp(ta).then_with(|| b.path.cmp(&a.path)));
    Ok(artifacts.into_iter().map(|(info, _)| info).collect())
  }
}
