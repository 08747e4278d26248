pub mod app_config;
pub mod memory;
pub mod postgres;

use aerobook_core::LedgerStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use app_config::Config;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use app_config::{DatabaseConfig, LedgerConfig, StoreBackend};

#[derive(Debug, thiserror::Error)]
pub enum StoreSetupError {
    #[error("database.url is required for the postgres backend")]
    MissingUrl,
    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Build the ledger store selected by `database.backend`.
pub async fn open_store(
    database: &DatabaseConfig,
    ledger: &LedgerConfig,
) -> Result<Arc<dyn LedgerStore>, StoreSetupError> {
    let lock_timeout = Duration::from_millis(ledger.lock_timeout_ms);

    match database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory ledger store");
            Ok(Arc::new(MemoryLedgerStore::new(lock_timeout)))
        }
        StoreBackend::Postgres => {
            let url = database.url.as_deref().ok_or(StoreSetupError::MissingUrl)?;
            let store = PgLedgerStore::connect(
                url,
                database.max_connections,
                Duration::from_secs(database.acquire_timeout_secs),
                lock_timeout,
            )
            .await?;
            store.migrate().await?;
            info!("Using PostgreSQL ledger store");
            Ok(Arc::new(store))
        }
    }
}
