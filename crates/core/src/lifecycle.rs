//! The two recurring maintenance passes. Each pass works item by item and a
//! failing item never stops the rest of the pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{PersonId, SuppressionKey};
use crate::platform::{Clock, MessagingPlatform};
use crate::store::{ConfigStore, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    /// Accounts removed between listing and writing back.
    pub vanished: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

enum RefreshOutcome {
    Refreshed,
    Vanished,
    Failed,
}

enum SweepOutcome {
    Kept,
    Removed,
    Failed,
}

#[derive(Clone)]
pub struct LifecycleManager {
    platform: Arc<dyn MessagingPlatform>,
    store: ConfigStore,
    clock: Arc<dyn Clock>,
}

impl LifecycleManager {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        store: ConfigStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { platform, store, clock }
    }

    /// Exchanges every account's refresh token and writes back only the two
    /// tokens. Fails as a whole only when the account list cannot be read.
    pub async fn refresh_tokens(&self) -> Result<RefreshReport, StoreError> {
        let ids = self.store.accounts.list_ids().await.map_err(|error| {
            warn!(
                event_name = "scheduler.token_refresh.list_failed",
                correlation_id = "scheduler",
                error = %error,
                "could not list accounts"
            );
            error
        })?;

        let outcomes = join_all(ids.iter().map(|id| self.refresh_account(id))).await;

        let mut report = RefreshReport::default();
        for (id, outcome) in ids.into_iter().zip(outcomes) {
            match outcome {
                RefreshOutcome::Refreshed => report.refreshed.push(id.0),
                RefreshOutcome::Vanished => report.vanished.push(id.0),
                RefreshOutcome::Failed => report.failed.push(id.0),
            }
        }

        info!(
            event_name = "scheduler.token_refresh.completed",
            correlation_id = "scheduler",
            refreshed = report.refreshed.len(),
            vanished = report.vanished.len(),
            failed = report.failed.len(),
        );
        Ok(report)
    }

    async fn refresh_account(&self, id: &PersonId) -> RefreshOutcome {
        let account = match self.store.accounts.find_by_id(id).await {
            Ok(Some(account)) => account,
            Ok(None) => return RefreshOutcome::Vanished,
            Err(error) => {
                warn!(
                    event_name = "scheduler.token_refresh.read_failed",
                    correlation_id = "scheduler",
                    account_id = %id,
                    error = %error,
                );
                return RefreshOutcome::Failed;
            }
        };

        let tokens = match self.platform.refresh_tokens(&account.tokens.refresh_token).await {
            Ok(tokens) => tokens,
            Err(error) => {
                warn!(
                    event_name = "scheduler.token_refresh.refresh_failed",
                    correlation_id = "scheduler",
                    account_id = %id,
                    error = %error,
                    "existing tokens kept"
                );
                return RefreshOutcome::Failed;
            }
        };

        // Settings may have been saved while the refresh call was in flight.
        let current = match self.store.accounts.find_by_id(id).await {
            Ok(Some(current)) => current,
            Ok(None) => return RefreshOutcome::Vanished,
            Err(error) => {
                warn!(
                    event_name = "scheduler.token_refresh.read_failed",
                    correlation_id = "scheduler",
                    account_id = %id,
                    error = %error,
                );
                return RefreshOutcome::Failed;
            }
        };

        match self.store.accounts.save(current.with_tokens(tokens)).await {
            Ok(()) => {
                info!(
                    event_name = "scheduler.token_refresh.account_refreshed",
                    correlation_id = "scheduler",
                    account_id = %id,
                );
                RefreshOutcome::Refreshed
            }
            Err(error) => {
                warn!(
                    event_name = "scheduler.token_refresh.write_failed",
                    correlation_id = "scheduler",
                    account_id = %id,
                    error = %error,
                );
                RefreshOutcome::Failed
            }
        }
    }

    /// Deletes every window that ends within the sweep lookahead of now.
    pub async fn sweep_suppressions(&self) -> Result<SweepReport, StoreError> {
        let keys = self.store.suppressions.list_keys().await.map_err(|error| {
            warn!(
                event_name = "scheduler.suppression_sweep.list_failed",
                correlation_id = "scheduler",
                error = %error,
                "could not list suppression windows"
            );
            error
        })?;

        let now = self.clock.now();
        let outcomes = join_all(keys.iter().map(|key| self.sweep_window(key, now))).await;

        let mut report = SweepReport { examined: keys.len(), ..SweepReport::default() };
        for (key, outcome) in keys.into_iter().zip(outcomes) {
            match outcome {
                SweepOutcome::Kept => {}
                SweepOutcome::Removed => report.removed.push(key.0),
                SweepOutcome::Failed => report.failed.push(key.0),
            }
        }

        info!(
            event_name = "scheduler.suppression_sweep.completed",
            correlation_id = "scheduler",
            examined = report.examined,
            removed = report.removed.len(),
            failed = report.failed.len(),
        );
        Ok(report)
    }

    async fn sweep_window(&self, key: &SuppressionKey, now: DateTime<Utc>) -> SweepOutcome {
        let window = match self.store.suppressions.find_by_key(key).await {
            Ok(Some(window)) => window,
            Ok(None) => return SweepOutcome::Kept,
            Err(error) => {
                warn!(
                    event_name = "scheduler.suppression_sweep.read_failed",
                    correlation_id = "scheduler",
                    suppression_key = %key,
                    error = %error,
                );
                return SweepOutcome::Failed;
            }
        };

        if !window.is_due_for_sweep(now) {
            return SweepOutcome::Kept;
        }

        match self.store.suppressions.remove(key).await {
            Ok(()) => SweepOutcome::Removed,
            Err(error) => {
                warn!(
                    event_name = "scheduler.suppression_sweep.remove_failed",
                    correlation_id = "scheduler",
                    suppression_key = %key,
                    error = %error,
                );
                SweepOutcome::Failed
            }
        }
    }
}
