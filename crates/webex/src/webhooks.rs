use reqwest::Method;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use autoresponder_core::domain::PersonId;
use autoresponder_core::platform::PlatformError;
use autoresponder_core::webhook::webhook_secret;

use crate::client::WebexClient;

/// Every webhook this integration creates carries this name; deregistration
/// matches on it.
pub const WEBHOOK_NAME: &str = "Autoresponder Webhook";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRegistration<'a> {
    name: &'a str,
    target_url: &'a str,
    resource: &'a str,
    event: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct WebhookList {
    #[serde(default)]
    items: Vec<WebhookEntry>,
}

#[derive(Deserialize)]
struct WebhookEntry {
    id: String,
    #[serde(default)]
    name: String,
}

impl WebexClient {
    pub async fn create_message_webhook(
        &self,
        token: &SecretString,
        owner: &PersonId,
    ) -> Result<(), PlatformError> {
        let registration = WebhookRegistration {
            name: WEBHOOK_NAME,
            target_url: &self.webhook_uri,
            resource: "messages",
            event: "created",
            secret: webhook_secret(owner.as_str()),
        };
        let request = self.authorized(Method::POST, "webhooks", token).json(&registration);
        let body = self.execute_json("webhooks", request).await?;

        if body.get("id").and_then(serde_json::Value::as_str).is_none() {
            return Err(PlatformError::MissingField {
                resource: "webhooks".to_owned(),
                field: "id".to_owned(),
            });
        }
        info!(
            event_name = "webex.webhook.registered",
            account_id = %owner,
            target_url = %self.webhook_uri,
        );
        Ok(())
    }

    /// Deletes every webhook named [`WEBHOOK_NAME`]. All deletions are
    /// attempted; the first failure is returned afterwards.
    pub async fn delete_named_webhooks(&self, token: &SecretString) -> Result<(), PlatformError> {
        let request = self.authorized(Method::GET, "webhooks", token);
        let list: WebhookList = self
            .execute("webhooks", request)
            .await?
            .json()
            .await
            .map_err(|error| PlatformError::Decode(format!("webhooks: {error}")))?;

        let mut first_failure = None;
        for entry in list.items.iter().filter(|entry| entry.name == WEBHOOK_NAME) {
            let path = format!("webhooks/{}", entry.id);
            let request = self.authorized(Method::DELETE, &path, token);
            match self.execute(&path, request).await {
                Ok(_) => info!(event_name = "webex.webhook.deleted", webhook_id = %entry.id),
                Err(error) => {
                    warn!(
                        event_name = "webex.webhook.delete_failed",
                        webhook_id = %entry.id,
                        error = %error,
                    );
                    first_failure.get_or_insert(error);
                }
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
