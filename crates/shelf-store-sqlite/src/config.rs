//! Store tuning and backup settings.
//!
//! Every field has a default, so an empty configuration source yields a
//! working store.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Derived indexing is enabled once the record count exceeds this.
  pub derived_index_threshold: usize,
  /// Stores at or below this many records always use the scan strategy.
  pub small_search_threshold:  usize,
  pub backup:                  BackupConfig,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      derived_index_threshold: 100,
      small_search_threshold:  100,
      backup:                  BackupConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
  /// Artifact directory. Defaults to `backups/` next to the store file.
  pub dir:           Option<PathBuf>,
  /// Retention cap per store, all kinds combined.
  pub max_artifacts: usize,
  /// Take an `auto` backup when the store is opened.
  pub on_open:       bool,
  /// Take an `auto` backup when the store is closed.
  pub on_close:      bool,
  /// Run the interval timer while the store is open.
  pub auto:          bool,
  pub interval_secs: u64,
}

impl BackupConfig {
  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
}

impl Default for BackupConfig {
  fn default() -> Self {
    Self {
      dir:           None,
      max_artifacts: 30,
      on_open:       true,
      on_close:      true,
      auto:          true,
      interval_secs: 2 * 60 * 60,
    }
  }
}
