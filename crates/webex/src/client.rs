use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use autoresponder_core::config::WebexConfig;
use autoresponder_core::domain::{PersonId, TokenPair};
use autoresponder_core::platform::{MessagingPlatform, PlatformError};

/// Thin reqwest wrapper bound to one API base URL and one OAuth client.
pub struct WebexClient {
    pub(crate) http: Client,
    pub(crate) api_base_url: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: SecretString,
    pub(crate) redirect_uri: String,
    pub(crate) webhook_uri: String,
}

impl WebexClient {
    pub fn from_config(config: &WebexConfig) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri(),
            webhook_uri: config.webhook_uri(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn authorized(
        &self,
        method: Method,
        path: &str,
        token: &SecretString,
    ) -> RequestBuilder {
        self.http.request(method, self.url(path)).bearer_auth(token.expose_secret())
    }

    /// Sends and requires a 2xx status; `endpoint` only labels errors and logs.
    pub(crate) async fn execute(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|error| PlatformError::Transport(format!("{endpoint}: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            debug!(endpoint, status = status.as_u16(), "webex request rejected");
            return Err(PlatformError::Status {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    pub(crate) async fn execute_json(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Value, PlatformError> {
        self.execute(endpoint, request)
            .await?
            .json::<Value>()
            .await
            .map_err(|error| PlatformError::Decode(format!("{endpoint}: {error}")))
    }
}

/// Path without its query string, used as the error label.
pub(crate) fn endpoint_label(path: &str) -> &str {
    path.split('?').next().unwrap_or(path).trim_start_matches('/')
}

#[async_trait]
impl MessagingPlatform for WebexClient {
    async fn lookup_person_id_by_email(
        &self,
        token: &SecretString,
        email: &str,
    ) -> Result<PersonId, PlatformError> {
        self.person_id_by_email(token, email).await
    }

    async fn get_field(
        &self,
        token: &SecretString,
        resource_path: &str,
        field: Option<&str>,
    ) -> Result<Value, PlatformError> {
        self.read_field(token, resource_path, field).await
    }

    async fn send_message(
        &self,
        token: &SecretString,
        recipient: &PersonId,
        markdown: &str,
    ) -> Result<(), PlatformError> {
        self.post_direct_message(token, recipient, markdown).await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, PlatformError> {
        self.grant_authorization_code(code).await
    }

    async fn refresh_tokens(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenPair, PlatformError> {
        self.grant_refresh_token(refresh_token).await
    }

    async fn register_webhook(
        &self,
        token: &SecretString,
        owner: &PersonId,
    ) -> Result<(), PlatformError> {
        self.create_message_webhook(token, owner).await
    }

    async fn deregister_webhook(&self, token: &SecretString) -> Result<(), PlatformError> {
        self.delete_named_webhooks(token).await
    }
}
