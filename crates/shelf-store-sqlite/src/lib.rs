//! SQLite backend for the Shelf record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! connection thread without blocking the async runtime. A store-wide
//! [`tokio::sync::RwLock`] serialises writes, schema rebuilds, backups and
//! restores against each other while letting reads proceed together.

mod backup;
mod derived;
mod encode;
mod schema;
mod search;
mod store;
mod tenant;

pub mod config;
pub mod error;

pub use config::{BackupConfig, StoreConfig};
pub use derived::BackfillReport;
pub use error::{BackupError, Error, RestoreError, Result};
pub use store::SqliteStore;
