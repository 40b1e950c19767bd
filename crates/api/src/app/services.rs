//! Service wiring: pick a storage backend and build the engine and catalog
//! service on top of it.

use std::sync::Arc;

use stockroom_infra::store::{InMemoryStore, PostgresStore, Store, StoreError};
use stockroom_infra::{CatalogService, EngineConfig, StockMovementEngine};

use crate::config::AppConfig;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub engine: StockMovementEngine<dyn Store>,
    pub catalog: CatalogService<dyn Store>,
    pub default_page_size: u32,
    pub backend: &'static str,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig, backend: &'static str) -> Self {
        let engine_config = EngineConfig {
            max_conflict_retries: config.max_conflict_retries,
        };
        Self {
            engine: StockMovementEngine::new(Arc::clone(&store), engine_config),
            catalog: CatalogService::new(store, config.max_conflict_retries),
            default_page_size: config.default_page_size,
            backend,
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config, "in_memory")
    }
}

/// Build services from configuration: Postgres when `DATABASE_URL` is set,
/// in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            tracing::info!("using postgres store");
            Ok(AppServices::new(Arc::new(store), config, "postgres"))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            Ok(AppServices::in_memory(config))
        }
    }
}
