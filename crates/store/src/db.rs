//! Connection setup and backend selection.
//!
//! The backend is chosen once at process start from [`StoreConfig`] and
//! handed out as `Arc<dyn Storage>`; nothing downstream knows which one is
//! running.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{BackendKind, StoreConfig};
use crate::storage::{OrmStorage, PgStorage, Storage, StoreError, StoreResult};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Connect the configured backend.
///
/// # Errors
///
/// Returns `StoreError::Io` if the database cannot be reached.
pub async fn open_storage(config: &StoreConfig) -> StoreResult<Arc<dyn Storage>> {
    connect(config.backend, &config.database_url).await
}

/// Connect `backend` to `database_url`.
///
/// # Errors
///
/// Returns `StoreError::Io` if the database cannot be reached.
pub async fn connect(
    backend: BackendKind,
    database_url: &SecretString,
) -> StoreResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match backend {
        BackendKind::Orm => Arc::new(OrmStorage::connect(database_url).await?),
        BackendKind::Sql => {
            let pool = create_pool(database_url)
                .await
                .map_err(|e| StoreError::io("connect", e))?;
            Arc::new(PgStorage::new(pool))
        }
    };
    info!(backend = storage.backend_name(), "storage connected");
    Ok(storage)
}
