//! Account onboarding and the owner-facing settings operations.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{PersonId, SuppressionSetting, UserConfig};
use crate::platform::{text_field, MessagingPlatform, PlatformError};
use crate::store::{ConfigStore, StoreError};

pub const MISSING_PRIMARY_EMAIL: &str = "Missing Primary Email";
pub const MISSING_AUTO_RESPONSE: &str = "Missing Auto Response";
pub const INVALID_PRIMARY_ACCOUNT: &str = "Invalid Primary Account";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no account is onboarded for `{0}`")]
    AccountNotFound(PersonId),
    #[error("a test message needs a primary contact and an auto-response")]
    TestUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug)]
pub struct Onboarded {
    pub account_id: PersonId,
    pub display_name: String,
    pub created: bool,
}

/// Submitted settings. Checkbox fields accept HTML form values (`checked`,
/// `on`) as well as JSON booleans.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsForm {
    #[serde(default)]
    pub primary_email: String,
    #[serde(default, deserialize_with = "checkbox")]
    pub primary_enabled: bool,
    #[serde(default)]
    pub auto_response: String,
    #[serde(default, alias = "mentionAll", deserialize_with = "checkbox")]
    pub mention_all_enabled: bool,
    #[serde(default, alias = "suppressionTime")]
    pub suppression_minutes: String,
    #[serde(default, alias = "status", deserialize_with = "checkbox")]
    pub response_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookTransition {
    Unchanged,
    Registered,
    Deregistered,
}

#[derive(Clone, Debug)]
pub struct SettingsOutcome {
    pub account: UserConfig,
    pub errors: Vec<String>,
    pub saved: bool,
    pub webhook: WebhookTransition,
}

/// What the settings page shows. Tokens are never included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub person_id: String,
    pub primary_id: String,
    pub primary_email: String,
    pub primary_enabled: bool,
    pub auto_response: String,
    pub mention_all_enabled: bool,
    pub suppression_minutes: String,
    pub response_enabled: bool,
    pub test_enabled: bool,
}

impl From<&UserConfig> for SettingsView {
    fn from(account: &UserConfig) -> Self {
        Self {
            person_id: account.id.0.clone(),
            primary_id: account.primary_id.as_ref().map(|id| id.0.clone()).unwrap_or_default(),
            primary_email: account.primary_email.clone(),
            primary_enabled: account.primary_enabled,
            auto_response: account.auto_response.clone(),
            mention_all_enabled: account.mention_all_enabled,
            suppression_minutes: account.suppression.as_stored().to_owned(),
            response_enabled: account.response_enabled,
            test_enabled: account.can_send_test(),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    platform: Arc<dyn MessagingPlatform>,
    store: ConfigStore,
}

impl AccountService {
    pub fn new(platform: Arc<dyn MessagingPlatform>, store: ConfigStore) -> Self {
        Self { platform, store }
    }

    /// Completes authorization: stores fresh tokens, keeping the settings of a
    /// returning account.
    pub async fn onboard(&self, code: &str) -> Result<Onboarded, SettingsError> {
        let tokens = self.platform.exchange_code(code).await?;
        let platform = self.platform.as_ref();
        let display_name =
            text_field(platform, &tokens.access_token, "people/me", "displayName").await?;
        let account_id =
            PersonId::new(text_field(platform, &tokens.access_token, "people/me", "id").await?);

        let (account, created) = match self.store.accounts.find_by_id(&account_id).await? {
            Some(existing) => (existing.with_tokens(tokens), false),
            None => (UserConfig::onboarded(account_id.clone(), tokens), true),
        };
        self.store.accounts.save(account).await?;

        info!(
            event_name = "account.onboarding.completed",
            correlation_id = %account_id,
            account_id = %account_id,
            created,
        );
        Ok(Onboarded { account_id, display_name, created })
    }

    pub async fn settings(&self, id: &PersonId) -> Result<UserConfig, SettingsError> {
        self.store
            .accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| SettingsError::AccountNotFound(id.clone()))
    }

    /// Validates and stores submitted settings, then moves the webhook to
    /// match the response switch. Validation failures are returned unsaved
    /// with the response switched off.
    pub async fn update_settings(
        &self,
        id: &PersonId,
        form: SettingsForm,
    ) -> Result<SettingsOutcome, SettingsError> {
        let existing = self.settings(id).await?;
        let mut errors = validate(&form);

        let mut updated = UserConfig {
            id: existing.id.clone(),
            tokens: existing.tokens.clone(),
            primary_id: None,
            primary_email: form.primary_email.trim().to_owned(),
            primary_enabled: form.primary_enabled,
            auto_response: form.auto_response,
            mention_all_enabled: form.mention_all_enabled,
            suppression: SuppressionSetting::parse(&form.suppression_minutes),
            response_enabled: form.response_enabled,
        };

        if !errors.is_empty() {
            updated.response_enabled = false;
            return Ok(SettingsOutcome {
                account: updated,
                errors,
                saved: false,
                webhook: WebhookTransition::Unchanged,
            });
        }

        if updated.primary_enabled {
            match self
                .platform
                .lookup_person_id_by_email(&existing.tokens.access_token, &updated.primary_email)
                .await
            {
                Ok(primary_id) => updated.primary_id = Some(primary_id),
                Err(error) => {
                    warn!(
                        event_name = "account.settings.primary_lookup_failed",
                        correlation_id = %id,
                        account_id = %id,
                        error = %error,
                    );
                    errors.push(INVALID_PRIMARY_ACCOUNT.to_owned());
                    updated.response_enabled = false;
                }
            }
        }

        self.store.accounts.save(updated.clone()).await?;

        let token = &existing.tokens.access_token;
        let webhook = match (existing.response_enabled, updated.response_enabled) {
            (false, true) => {
                self.platform.deregister_webhook(token).await?;
                self.platform.register_webhook(token, &updated.id).await?;
                WebhookTransition::Registered
            }
            (true, false) => {
                self.platform.deregister_webhook(token).await?;
                WebhookTransition::Deregistered
            }
            _ => WebhookTransition::Unchanged,
        };

        info!(
            event_name = "account.settings.saved",
            correlation_id = %id,
            account_id = %id,
            response_enabled = updated.response_enabled,
            webhook = ?webhook,
        );
        Ok(SettingsOutcome { account: updated, errors, saved: true, webhook })
    }

    /// Sends the configured auto-response to the primary contact.
    pub async fn send_test(&self, id: &PersonId) -> Result<(), SettingsError> {
        let account = self.settings(id).await?;
        let Some(primary_id) = account.primary_id.as_ref().filter(|_| account.can_send_test())
        else {
            return Err(SettingsError::TestUnavailable);
        };
        self.platform
            .send_message(&account.tokens.access_token, primary_id, &account.auto_response)
            .await?;
        Ok(())
    }

    /// Removes the account. The webhook is deregistered first on a best-effort
    /// basis; events that still arrive are skipped as unknown accounts.
    pub async fn remove_account(&self, id: &PersonId) -> Result<(), SettingsError> {
        if let Some(account) = self.store.accounts.find_by_id(id).await? {
            if account.response_enabled {
                if let Err(error) =
                    self.platform.deregister_webhook(&account.tokens.access_token).await
                {
                    warn!(
                        event_name = "account.removal.deregister_failed",
                        correlation_id = %id,
                        account_id = %id,
                        error = %error,
                    );
                }
            }
        }
        self.store.accounts.remove(id).await?;
        info!(event_name = "account.removal.completed", correlation_id = %id, account_id = %id);
        Ok(())
    }
}

fn validate(form: &SettingsForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.primary_enabled && form.primary_email.trim().is_empty() {
        errors.push(MISSING_PRIMARY_EMAIL.to_owned());
    }
    if form.auto_response.trim().is_empty() {
        errors.push(MISSING_AUTO_RESPONSE.to_owned());
    }
    errors
}

fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Flag(flag) => flag,
        Raw::Text(text) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "checked" | "on" | "true" | "1")
        }
    })
}
