//! Storage adapter registry.

use std::sync::Arc;

use eventvault_core::storage::StorageAdapter;
use eventvault_engine::InMemoryAdapter;
use eventvault_postgres::PgAdapter;
use sqlx::postgres::PgPoolOptions;

use crate::config::{ServerConfig, StorageKind};
use crate::error::AppError;

/// Builds the adapter selected by the configuration. The postgres pool is
/// created lazily; the first connection is made by `Eventstore::init`.
///
/// # Errors
///
/// Returns `AppError::Config` if the postgres backend has no database URL,
/// or `AppError::Database` if the URL cannot be parsed.
pub fn build_adapter(config: &ServerConfig) -> Result<Arc<dyn StorageAdapter>, AppError> {
    match config.storage {
        StorageKind::InMemory => Ok(Arc::new(InMemoryAdapter::new())),
        StorageKind::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".into())
            })?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(config.connect_timeout)
                .connect_lazy(url)?;
            Ok(Arc::new(PgAdapter::new(pool)))
        }
    }
}
