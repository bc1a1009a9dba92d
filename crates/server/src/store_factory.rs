use std::sync::Arc;

use ferry_store::MetadataStore;
use ferry_store_memory::MemoryMetadataStore;
#[cfg(feature = "postgres")]
use ferry_store_postgres::{PostgresConfig, PostgresMetadataStore};

use crate::config::MetadataConfig;
use crate::error::ServerError;

/// Whether opening the stores may change them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSetup {
    /// Validate blob storage and run metadata migrations.
    Prepare,
    /// Open the stores as they are, writing nothing.
    Untouched,
}

/// Create the metadata store named by `[metadata] backend`.
///
/// With [`StoreSetup::Prepare`] the Postgres backend runs its migrations
/// while connecting.
#[allow(clippy::unused_async)]
#[cfg_attr(not(feature = "postgres"), allow(unused_variables))]
pub async fn create_metadata_store(
    config: &MetadataConfig,
    setup: StoreSetup,
) -> Result<Arc<dyn MetadataStore>, ServerError> {
    let store: Arc<dyn MetadataStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryMetadataStore::new()),
        #[cfg(feature = "postgres")]
        "postgres" => {
            let pg_config = postgres_config(config)?;
            let store = match setup {
                StoreSetup::Prepare => PostgresMetadataStore::new(pg_config).await,
                StoreSetup::Untouched => PostgresMetadataStore::connect_existing(pg_config).await,
            }
            .map_err(|e| ServerError::Config(format!("metadata postgres: {e}")))?;
            Arc::new(store)
        }
        other => {
            return Err(ServerError::Config(format!(
                "unsupported metadata backend: {other}"
            )));
        }
    };
    Ok(store)
}

#[cfg(feature = "postgres")]
fn postgres_config(config: &MetadataConfig) -> Result<PostgresConfig, ServerError> {
    let url = config.url.clone().ok_or_else(|| {
        ServerError::Config("metadata postgres backend requires [metadata] url".into())
    })?;
    let defaults = PostgresConfig::default();
    Ok(PostgresConfig {
        url,
        pool_size: config.pool_size.unwrap_or(defaults.pool_size),
        schema: config.schema.clone().unwrap_or(defaults.schema),
        table_prefix: config.table_prefix.clone().unwrap_or(defaults.table_prefix),
        ssl_mode: config.ssl_mode.clone(),
        ssl_root_cert: config.ssl_root_cert.clone(),
        ssl_cert: config.ssl_cert.clone(),
        ssl_key: config.ssl_key.clone(),
    })
}
