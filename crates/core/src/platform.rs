//! Contract of the messaging platform REST client. Implementations own their
//! transport, timeouts and endpoint layout; callers only see these calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{PersonId, TokenPair};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Transport(String),
    #[error("platform returned status {status} for `{endpoint}`")]
    Status { endpoint: String, status: u16 },
    #[error("platform response could not be decoded: {0}")]
    Decode(String),
    #[error("platform response is missing `{field}` for `{resource}`")]
    MissingField { resource: String, field: String },
    #[error("no person found for `{0}`")]
    PersonNotFound(String),
}

#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    async fn lookup_person_id_by_email(
        &self,
        token: &SecretString,
        email: &str,
    ) -> Result<PersonId, PlatformError>;

    /// Reads `resource_path`; with `field` set, returns only that member.
    /// Absent or empty values are reported as [`PlatformError::MissingField`].
    async fn get_field(
        &self,
        token: &SecretString,
        resource_path: &str,
        field: Option<&str>,
    ) -> Result<Value, PlatformError>;

    async fn send_message(
        &self,
        token: &SecretString,
        recipient: &PersonId,
        markdown: &str,
    ) -> Result<(), PlatformError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, PlatformError>;

    async fn refresh_tokens(&self, refresh_token: &SecretString)
        -> Result<TokenPair, PlatformError>;

    /// Registers the message webhook; the signing secret is derived from `owner`.
    async fn register_webhook(
        &self,
        token: &SecretString,
        owner: &PersonId,
    ) -> Result<(), PlatformError>;

    /// Deletes every webhook carrying this integration's name.
    async fn deregister_webhook(&self, token: &SecretString) -> Result<(), PlatformError>;
}

/// Reads a single field and requires it to be a non-empty string.
pub async fn text_field(
    platform: &dyn MessagingPlatform,
    token: &SecretString,
    resource_path: &str,
    field: &str,
) -> Result<String, PlatformError> {
    let value = platform.get_field(token, resource_path, Some(field)).await?;
    match value {
        Value::String(text) if !text.is_empty() => Ok(text),
        _ => Err(PlatformError::MissingField {
            resource: resource_path.to_owned(),
            field: field.to_owned(),
        }),
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
