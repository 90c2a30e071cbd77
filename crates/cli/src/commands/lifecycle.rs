//! One-off lifecycle passes, run against the configured store instead of
//! waiting for the server's schedule.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use autoresponder_core::config::AppConfig;
use autoresponder_core::lifecycle::LifecycleManager;
use autoresponder_core::platform::SystemClock;
use autoresponder_core::store::{ConfigStore, StoreError};
use autoresponder_db::sql_config_store;
use autoresponder_webex::WebexClient;

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, Failure};

pub fn sweep() -> CommandResult {
    match run_pass(|lifecycle| async move { lifecycle.sweep_suppressions().await }) {
        Ok(report) => {
            let message = format!(
                "examined {} suppression windows, removed {}",
                report.examined,
                report.removed.len()
            );
            CommandResult::success_with_report("sweep", message, to_value(&report))
        }
        Err(failure) => CommandResult::from_failure("sweep", failure),
    }
}

pub fn refresh() -> CommandResult {
    match run_pass(|lifecycle| async move { lifecycle.refresh_tokens().await }) {
        Ok(report) => {
            let message = format!(
                "refreshed {} accounts, {} failed",
                report.refreshed.len(),
                report.failed.len()
            );
            CommandResult::success_with_report("refresh", message, to_value(&report))
        }
        Err(failure) => CommandResult::from_failure("refresh", failure),
    }
}

fn run_pass<F, Fut, T>(pass: F) -> Result<T, Failure>
where
    F: FnOnce(LifecycleManager) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let config = load_config()?;
    runtime()?.block_on(async {
        let pool = migrated_pool(&config).await?;
        let lifecycle = lifecycle_for(&config, sql_config_store(pool.clone()))?;
        let outcome = pass(lifecycle).await;
        pool.close().await;
        outcome.map_err(|error| Failure::new("store", error.to_string(), 7))
    })
}

fn lifecycle_for(config: &AppConfig, store: ConfigStore) -> Result<LifecycleManager, Failure> {
    let platform = WebexClient::from_config(&config.webex)
        .map_err(|error| Failure::new("platform", error.to_string(), 6))?;
    Ok(LifecycleManager::new(Arc::new(platform), store, Arc::new(SystemClock)))
}

fn to_value(report: &impl Serialize) -> Option<serde_json::Value> {
    serde_json::to_value(report).ok()
}
