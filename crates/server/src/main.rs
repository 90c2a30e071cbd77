mod app;
mod bootstrap;
mod health;
mod scheduler;
mod sessions;
mod settings;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use autoresponder_core::config::{AppConfig, LoadOptions};
use autoresponder_core::lifecycle::LifecycleManager;
use autoresponder_core::platform::{Clock, SystemClock};

fn init_logging(config: &AppConfig) {
    use autoresponder_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let lifecycle = LifecycleManager::new(app.platform.clone(), app.store.clone(), clock.clone());
    let scheduler = scheduler::Scheduler::from_config(&app.config.scheduler, lifecycle, clock.clone())
        .context("scheduler configuration rejected")?
        .spawn();

    let state = app::AppState::new(app.platform.clone(), app.store.clone(), clock, &app.config);
    let router = app::router(state).merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        webhook_uri = %app.config.webex.webhook_uri(),
        "autoresponder listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "autoresponder stopping"
    );
    scheduler.shutdown();

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.pool_close_timeout",
            correlation_id = "shutdown",
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}
