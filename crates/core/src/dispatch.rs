//! Side effects for a qualifying event: the auto-response, the suppression
//! window and the optional digest for the primary contact.
//!
//! Steps are not transactional. Only a failed auto-response aborts; later
//! failures are logged and reported.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{InboundEvent, PersonId, SuppressionKey, SuppressionWindow, UserConfig};
use crate::platform::{text_field, Clock, MessagingPlatform, PlatformError};
use crate::store::ConfigStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("event has no sender to respond to")]
    MissingSender,
    #[error("auto-response was not delivered: {0}")]
    AutoResponse(#[from] PlatformError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuppressionOutcome {
    Recorded { until: i64 },
    Disabled,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DigestOutcome {
    Disabled,
    Forwarded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub suppression: SuppressionOutcome,
    pub digest: DigestOutcome,
}

#[derive(Clone)]
pub struct ResponseDispatcher {
    platform: Arc<dyn MessagingPlatform>,
    store: ConfigStore,
    clock: Arc<dyn Clock>,
}

impl ResponseDispatcher {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        store: ConfigStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { platform, store, clock }
    }

    pub async fn dispatch(
        &self,
        event: &InboundEvent,
        account: &UserConfig,
    ) -> Result<DispatchReport, DispatchError> {
        let sender = event.data.person_id.as_ref().ok_or(DispatchError::MissingSender)?;
        let token = &account.tokens.access_token;

        self.platform.send_message(token, sender, &account.auto_response).await.map_err(
            |error| {
                warn!(
                    event_name = "webhook.dispatch.auto_response_failed",
                    correlation_id = %event.id,
                    account_id = %account.id,
                    recipient_id = %sender,
                    error = %error,
                    "auto-response failed"
                );
                DispatchError::from(error)
            },
        )?;
        info!(
            event_name = "webhook.dispatch.auto_response_sent",
            correlation_id = %event.id,
            account_id = %account.id,
            recipient_id = %sender,
        );

        let suppression = self.record_suppression(event, account, sender).await;
        let digest = if account.primary_enabled {
            self.forward_digest(event, account, sender).await
        } else {
            DigestOutcome::Disabled
        };

        Ok(DispatchReport { suppression, digest })
    }

    async fn record_suppression(
        &self,
        event: &InboundEvent,
        account: &UserConfig,
        sender: &PersonId,
    ) -> SuppressionOutcome {
        let Some(minutes) = account.suppression.window_minutes() else {
            return SuppressionOutcome::Disabled;
        };

        let key = SuppressionKey::new(&account.id, sender);
        let window = SuppressionWindow::starting_at(key.clone(), self.clock.now(), minutes);
        let until = window.suppress_until;
        match self.store.suppressions.save(window).await {
            Ok(()) => SuppressionOutcome::Recorded { until },
            Err(error) => {
                warn!(
                    event_name = "webhook.dispatch.suppression_save_failed",
                    correlation_id = %event.id,
                    suppression_key = %key,
                    error = %error,
                    "auto-response sent but suppression window not stored"
                );
                SuppressionOutcome::Failed
            }
        }
    }

    async fn forward_digest(
        &self,
        event: &InboundEvent,
        account: &UserConfig,
        sender: &PersonId,
    ) -> DigestOutcome {
        let Some(primary) = account.primary_id.as_ref() else {
            warn!(
                event_name = "webhook.dispatch.digest_skipped",
                correlation_id = %event.id,
                account_id = %account.id,
                "primary contact enabled without a resolved person id"
            );
            return DigestOutcome::Failed;
        };

        let result = async {
            let digest = self.compose_digest(event, account, sender).await?;
            self.platform.send_message(&account.tokens.access_token, primary, &digest).await
        }
        .await;

        match result {
            Ok(()) => {
                info!(
                    event_name = "webhook.dispatch.digest_forwarded",
                    correlation_id = %event.id,
                    account_id = %account.id,
                    recipient_id = %primary,
                );
                DigestOutcome::Forwarded
            }
            Err(error) => {
                warn!(
                    event_name = "webhook.dispatch.digest_failed",
                    correlation_id = %event.id,
                    account_id = %account.id,
                    error = %error,
                    "digest not forwarded"
                );
                DigestOutcome::Failed
            }
        }
    }

    async fn compose_digest(
        &self,
        event: &InboundEvent,
        account: &UserConfig,
        sender: &PersonId,
    ) -> Result<String, PlatformError> {
        let platform = self.platform.as_ref();
        let token = &account.tokens.access_token;

        let message_path = format!("messages/{}", event_field(&event.data.id, "id")?);
        let message = platform.get_field(token, &message_path, None).await?;
        let email = message
            .get("personEmail")
            .and_then(Value::as_str)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| PlatformError::MissingField {
                resource: message_path.clone(),
                field: "personEmail".to_owned(),
            })?;
        // file-only messages carry no text
        let text = message.get("text").and_then(Value::as_str).unwrap_or_default();

        let name = text_field(platform, token, &format!("people/{sender}"), "displayName").await?;
        let room_title = if event.is_group_room() {
            let room_path = format!("rooms/{}", event_field(&event.data.room_id, "roomId")?);
            Some(text_field(platform, token, &room_path, "title").await?)
        } else {
            None
        };

        Ok(digest_markdown(&name, email, text, room_title.as_deref()))
    }
}

fn event_field<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, PlatformError> {
    value.as_deref().filter(|value| !value.is_empty()).ok_or_else(|| PlatformError::MissingField {
        resource: "event data".to_owned(),
        field: field.to_owned(),
    })
}

pub fn digest_markdown(name: &str, email: &str, text: &str, room_title: Option<&str>) -> String {
    match room_title {
        Some(title) => format!(
            "You have received the following message from **{name}** (*{email}*) in **{title}**\n\n>*{text}*"
        ),
        None => format!(
            "You have received the following message from **{name}** (*{email}*)\n\n>*{text}*"
        ),
    }
}
