use std::sync::Arc;

use autoresponder_core::store::{ConfigStore, StoreError};

use crate::DbPool;

pub mod account;
pub mod suppression;

pub use account::SqlAccountRepository;
pub use suppression::SqlSuppressionRepository;

/// Both repositories sharing one pool.
pub fn sql_config_store(pool: DbPool) -> ConfigStore {
    ConfigStore::new(
        Arc::new(SqlAccountRepository::new(pool.clone())),
        Arc::new(SqlSuppressionRepository::new(pool)),
    )
}

pub(crate) fn database_error(error: sqlx::Error) -> StoreError {
    tracing::debug!(
        event_name = "db.store.query_failed",
        correlation_id = "store",
        error = %error,
    );
    match error {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::Decode(error.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) async fn setup_pool() -> DbPool {
    let pool = crate::connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    crate::migrations::run_pending(&pool).await.expect("migrations");
    pool
}
