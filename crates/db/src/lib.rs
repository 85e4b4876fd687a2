pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod records;

use std::sync::Arc;

use partsmart_core::config::{AppConfig, StoreBackend};
use partsmart_core::store::RecordStore;
use sqlx::migrate::MigrateError;
use thiserror::Error;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{MarketplaceSeedDataset, SeedFlowInfo, SeedResult, VerificationResult};
pub use records::{InMemoryRecordStore, SqlRecordStore};

#[derive(Debug, Error)]
pub enum OpenStoreError {
    #[error("failed to connect to `{url}`: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] MigrateError),
}

/// Opens the configured record store, applying pending migrations for SQLite.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn RecordStore>, OpenStoreError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryRecordStore::new())),
        StoreBackend::Sqlite => {
            let pool = connect_with_config(&config.database).await.map_err(|source| {
                OpenStoreError::Connect { url: config.database.url.clone(), source }
            })?;
            migrations::run_pending(&pool).await?;
            tracing::debug!(
                event_name = "store.opened",
                backend = config.store.backend.as_str(),
                "record store ready"
            );
            Ok(Arc::new(SqlRecordStore::new(pool)))
        }
    }
}
