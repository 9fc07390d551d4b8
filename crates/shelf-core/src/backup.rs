//! Backup artifact naming and retention policy.
//!
//! Artifacts are named `<store-id>_<kind>_<YYYYMMDD_HHMMSS>.db`, with a
//! `_<n>` collision suffix when two backups land in the same second. The
//! filesystem work lives in the backends; this module is pure.

use std::{fmt, path::PathBuf, str::FromStr, time::SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extension of backup artifacts.
pub const ARTIFACT_EXTENSION: &str = "db";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
  /// Taken on open and by the interval timer.
  Auto,
  /// Explicitly requested by the caller.
  Manual,
  /// Safety snapshot taken immediately before a restore.
  Rollback,
}

impl BackupKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Auto => "auto",
      Self::Manual => "manual",
      Self::Rollback => "rollback",
    }
  }
}

impl fmt::Display for BackupKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for BackupKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "auto" => Ok(Self::Auto),
      "manual" => Ok(Self::Manual),
      "rollback" => Ok(Self::Rollback),
      other => Err(format!("unknown backup kind: {other:?}")),
    }
  }
}

/// A backup artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
  pub path:       PathBuf,
  pub kind:       BackupKind,
  pub size:       u64,
  /// Modification time of the artifact file.
  pub created_at: DateTime<Utc>,
}

/// Build an artifact file name. `collision` is `0` for the plain name and
/// `n > 0` for the n-th same-second duplicate.
pub fn artifact_file_name(
  store_id: &str,
  kind: BackupKind,
  taken_at: NaiveDateTime,
  collision: u32,
) -> String {
  let stamp = taken_at.format(TIMESTAMP_FORMAT);
  if collision == 0 {
    format!("{store_id}_{kind}_{stamp}.{ARTIFACT_EXTENSION}")
  } else {
    format!("{store_id}_{kind}_{stamp}_{collision}.{ARTIFACT_EXTENSION}")
  }
}

/// Parse an artifact file name belonging to `store_id`.
///
/// Returns the kind and timestamp, or `None` for files that are not this
/// store's artifacts (including artifacts of a store whose id merely shares
/// a prefix).
pub fn parse_artifact_name(store_id: &str, file_name: &str) -> Option<(BackupKind, NaiveDateTime)> {
  let stem = file_name.strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))?;
  let rest = stem.strip_prefix(store_id)?.strip_prefix('_')?;
  let (kind, rest) = rest.split_once('_')?;
  let kind = kind.parse().ok()?;

  // `YYYYMMDD_HHMMSS` is 15 bytes; anything after must be `_<n>`.
  let stamp = rest.get(..15)?;
  match &rest[15..] {
    "" => {}
    suffix => {
      let n = suffix.strip_prefix('_')?;
      if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
        return None;
      }
    }
  }
  let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
  Some((kind, taken_at))
}

/// Pick the artifacts to delete so that at most `max_artifacts` remain.
///
/// Oldest modification time goes first; ties are broken by path so the
/// choice is deterministic.
pub fn select_evictions(
  mut artifacts: Vec<(PathBuf, SystemTime)>,
  max_artifacts: usize,
) -> Vec<PathBuf> {
  if artifacts.len() <= max_artifacts {
    return Vec::new();
  }
  artifacts.sort_by(|(pa, ta), (pb, tb)| ta.cmp(tb).then_with(|| pa.cmp(pb)));
  let excess = artifacts.len() - max_artifacts;
  artifacts.into_iter().take(excess).map(|(p, _)| p).collect()
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::NaiveDate;

  use super::*;

  fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
      .unwrap()
      .and_hms_opt(h, m, s)
      .unwrap()
  }

  #[test]
  fn names_embed_store_kind_and_timestamp() {
    assert_eq!(
      artifact_file_name("user_alice", BackupKind::Auto, at(8, 5, 3), 0),
      "user_alice_auto_20240309_080503.db"
    );
    assert_eq!(
      artifact_file_name("inv", BackupKind::Rollback, at(23, 59, 59), 2),
      "inv_rollback_20240309_235959_2.db"
    );
  }

  #[test]
  fn parse_accepts_own_artifacts() {
    for kind in [BackupKind::Auto, BackupKind::Manual, BackupKind::Rollback] {
      for collision in [0, 1, 12] {
        let name = artifact_file_name("user_alice", kind, at(1, 2, 3), collision);
        assert_eq!(parse_artifact_name("user_alice", &name), Some((kind, at(1, 2, 3))));
      }
    }
  }

  #[test]
  fn parse_rejects_foreign_files() {
    // Different store sharing a prefix.
    assert_eq!(parse_artifact_name("user", "user_alice_auto_20240309_080503.db"), None);
    assert_eq!(parse_artifact_name("inv", "inv_weekly_20240309_080503.db"), None);
    assert_eq!(parse_artifact_name("inv", "inv_auto_20240309_080503.sqlite"), None);
    assert_eq!(parse_artifact_name("inv", "inv_auto_2024.db"), None);
    assert_eq!(parse_artifact_name("inv", "inv_auto_20240309_080503_x.db"), None);
    assert_eq!(parse_artifact_name("inv", "inv_auto_20241399_080503.db"), None);
  }

  #[test]
  fn evicts_oldest_first() {
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
    let artifacts: Vec<_> = (0..5u64)
      .map(|i| (PathBuf::from(format!("b{i}.db")), base + Duration::from_secs(10 - i)))
      .collect();
    // b4 is the oldest, then b3.
    let evicted = select_evictions(artifacts, 3);
    assert_eq!(evicted, [PathBuf::from("b4.db"), PathBuf::from("b3.db")]);
  }

  #[test]
  fn nothing_evicted_under_cap() {
    let now = SystemTime::now();
    let artifacts = vec![(PathBuf::from("a.db"), now), (PathBuf::from("b.db"), now)];
    assert!(select_evictions(artifacts.clone(), 2).is_empty());
    assert!(select_evictions(artifacts, 5).is_empty());
  }

  #[test]
  fn equal_times_break_ties_by_path() {
    let now = SystemTime::now();
    let artifacts = vec![
      (PathBuf::from("c.db"), now),
      (PathBuf::from("a.db"), now),
      (PathBuf::from("b.db"), now),
    ];
    assert_eq!(select_evictions(artifacts, 1), [PathBuf::from("a.db"), PathBuf::from("b.db")]);
  }
}
