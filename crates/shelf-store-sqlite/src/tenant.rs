//! Per-tenant store bootstrap.

use shelf_core::{store::RecordStore, tenant::TenantCatalog};
use tracing::info;

use crate::{Error, Result, StoreConfig, store::SqliteStore};

impl SqliteStore {
  /// Open the store registered for `tenant`.
  ///
  /// A fresh store (no persisted schema) is defined from the schema the
  /// catalog holds for the tenant, if any. An existing schema is never
  /// replaced here.
  pub async fn open_for_tenant<C: TenantCatalog>(
    catalog: &C,
    tenant: &str,
    config: StoreConfig,
  ) -> Result<Self> {
    let entry = catalog
      .lookup(tenant)
      .await
      .map_err(|e| Error::Catalog(Box::new(e)))?
      .ok_or_else(|| Error::UnknownTenant(tenant.to_owned()))?;

    let store = Self::open_with_config(&entry.store_file_path, config).await?;

    if store.describe().await?.is_empty()
      && let Some(schema) = entry.schema()?
    {
      info!(tenant, columns = schema.columns().len(), "bootstrapping tenant schema");
      store.define(schema.into_columns()).await?;
    }

    Ok(store)
  }
}
