//! Lookup interface for the tenant catalog.
//!
//! The catalog itself (keyed storage of tenants) lives outside this
//! workspace. Stores only need to resolve a tenant to its store file and the
//! schema it was created with.

use std::{future::Future, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, schema::Schema};

/// What the catalog knows about one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantEntry {
  pub store_file_path:   PathBuf,
  /// JSON array of column definitions, if the tenant has a schema.
  pub serialized_schema: Option<String>,
}

impl TenantEntry {
  pub fn schema(&self) -> Result<Option<Schema>> {
    self
      .serialized_schema
      .as_deref()
      .filter(|raw| !raw.trim().is_empty())
      .map(Schema::from_json)
      .transpose()
  }
}

pub trait TenantCatalog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Resolve `tenant`. Returns `None` for unknown tenants.
  fn lookup<'a>(
    &'a self,
    tenant: &'a str,
  ) -> impl Future<Output = Result<Option<TenantEntry>, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_serialized_schema() {
    let entry = TenantEntry {
      store_file_path:   "user_alice.db".into(),
      serialized_schema: Some(r#"[{"name":"sku","required":true}]"#.into()),
    };
    let schema = entry.schema().unwrap().unwrap();
    assert!(schema.column("sku").unwrap().required);
  }

  #[test]
  fn blank_schema_is_none() {
    let entry = TenantEntry {
      store_file_path:   "user_bob.db".into(),
      serialized_schema: Some("  ".into()),
    };
    assert!(entry.schema().unwrap().is_none());
  }

  #[test]
  fn malformed_schema_is_an_error() {
    let entry = TenantEntry {
      store_file_path:   "user_carol.db".into(),
      serialized_schema: Some("[]".into()),
    };
    assert!(entry.schema().is_err());
  }
}
