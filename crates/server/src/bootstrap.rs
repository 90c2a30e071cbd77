use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use autoresponder_core::config::AppConfig;
use autoresponder_core::platform::PlatformError;
use autoresponder_core::store::ConfigStore;
use autoresponder_db::{connect_with_settings, migrations, sql_config_store, DbPool};
use autoresponder_webex::WebexClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: ConfigStore,
    pub platform: Arc<WebexClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("webex client could not be built: {0}")]
    Platform(#[source] PlatformError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let platform = WebexClient::from_config(&config.webex).map_err(BootstrapError::Platform)?;
    let store = sql_config_store(db_pool.clone());

    Ok(Application { config, db_pool, store, platform: Arc::new(platform) })
}
