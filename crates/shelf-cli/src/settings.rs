//! Layered configuration: defaults, then the TOML file, then `SHELF_*`
//! environment variables.
//!
//! ```toml
//! store_path = "inventory.db"
//!
//! [store]
//! derived_index_threshold = 100
//!
//! [store.backup]
//! dir           = "backups"
//! max_artifacts = 30
//! ```
//!
//! Nested keys are reachable from the environment with a double underscore,
//! e.g. `SHELF_STORE__BACKUP__MAX_ARTIFACTS=5`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use shelf_store_sqlite::StoreConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path: PathBuf,
  pub store:      StoreConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("shelf.db"),
      store:      StoreConfig::default(),
    }
  }
}

pub fn load(path: &Path) -> anyhow::Result<Settings> { load_with_env(path, None) }

/// `env` replaces the process environment when given.
fn load_with_env(
  path: &Path,
  env: Option<config::Map<String, String>>,
) -> anyhow::Result<Settings> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("SHELF")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(env),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise settings")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env<const N: usize>(vars: [(&str, &str); N]) -> Option<config::Map<String, String>> {
    Some(vars.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
  }

  #[test]
  fn missing_file_yields_defaults() {
    let settings = load_with_env(Path::new("does-not-exist.toml"), env([])).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("shelf.db"));
    assert_eq!(settings.store, StoreConfig::default());
  }

  #[test]
  fn environment_overrides_nested_keys() {
    let settings = load_with_env(
      Path::new("does-not-exist.toml"),
      env([
        ("SHELF_STORE_PATH", "inventory.db"),
        ("SHELF_STORE__BACKUP__MAX_ARTIFACTS", "5"),
        ("SHELF_STORE__BACKUP__ON_CLOSE", "false"),
        ("OTHER_STORE_PATH", "ignored.db"),
      ]),
    )
    .unwrap();
    assert_eq!(settings.store_path, PathBuf::from("inventory.db"));
    assert_eq!(settings.store.backup.max_artifacts, 5);
    assert!(!settings.store.backup.on_close);
    assert_eq!(settings.store.derived_index_threshold, 100);
  }
}
