//! Fixtures shared by the unit tests in this crate and, behind the
//! `test-support` feature, by the db, server and cli test suites.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::domain::{
    EventData, EventKind, InboundEvent, PersonId, Resource, RoomType, SuppressionSetting,
    TokenPair, UserConfig,
};
use crate::platform::{Clock, MessagingPlatform, PlatformError};
use crate::store::{
    AccountRepository, ConfigStore, InMemoryAccountRepository, StoreError,
    SuppressionRepository,
};
use crate::domain::{SuppressionKey, SuppressionWindow};

pub const OWNER_ID: &str = "OWNER-PERSON-ID-0123456789ABCDEF";
pub const SENDER_ID: &str = "SENDER-PERSON-ID";
pub const PRIMARY_ID: &str = "PRIMARY-PERSON-ID";
pub const PRIMARY_EMAIL: &str = "primary@example.com";
pub const AUTO_RESPONSE: &str = "Out of office until Monday";

pub fn tokens(access: &str, refresh: &str) -> TokenPair {
    TokenPair { access_token: access.to_owned().into(), refresh_token: refresh.to_owned().into() }
}

/// Owner account with a primary contact on file but digests switched off.
pub fn account(response_enabled: bool) -> UserConfig {
    UserConfig {
        id: PersonId::new(OWNER_ID),
        tokens: tokens("owner-access", "owner-refresh"),
        primary_id: Some(PersonId::new(PRIMARY_ID)),
        primary_email: PRIMARY_EMAIL.to_owned(),
        primary_enabled: false,
        auto_response: AUTO_RESPONSE.to_owned(),
        mention_all_enabled: true,
        suppression: SuppressionSetting::Minutes("10".to_owned()),
        response_enabled,
    }
}

pub fn message_event(room_type: RoomType) -> InboundEvent {
    InboundEvent {
        id: "EVT-1".to_owned(),
        resource: Resource::Messages,
        event: EventKind::Created,
        actor_id: PersonId::new(SENDER_ID),
        created_by: PersonId::new(OWNER_ID),
        data: EventData {
            id: Some("MSG-1".to_owned()),
            room_id: Some("ROOM-1".to_owned()),
            room_type: Some(room_type),
            person_id: Some(PersonId::new(SENDER_ID)),
            person_email: Some("sender@example.com".to_owned()),
            mentioned_people: Vec::new(),
            mentioned_groups: Vec::new(),
        },
    }
}

/// Webhook envelope matching [`message_event`], as the platform would post it.
pub fn message_envelope(room_type: &str) -> Value {
    json!({
        "id": "EVT-1",
        "name": "Autoresponder Webhook",
        "created": "2026-03-02T09:00:00.000Z",
        "targetUrl": "https://responder.example.com/webhook",
        "resource": "messages",
        "event": "created",
        "orgId": "ORG-1",
        "createdBy": OWNER_ID,
        "appId": "APP-1",
        "ownedBy": "creator",
        "status": "active",
        "actorId": SENDER_ID,
        "data": {
            "id": "MSG-1",
            "roomId": "ROOM-1",
            "roomType": room_type,
            "personId": SENDER_ID,
            "personEmail": "sender@example.com",
            "created": "2026-03-02T09:00:00.000Z"
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    pub fn now_value(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now_value()
    }
}

/// 2026-03-02 09:00:00 UTC, a Monday.
pub fn fixed_clock() -> FixedClock {
    FixedClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_default())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub token: String,
    pub recipient: PersonId,
    pub markdown: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookCall {
    Registered { token: String, owner: PersonId },
    Deregistered { token: String },
}

/// In-process stand-in for the platform API. Responses are scripted up front;
/// every call that changes remote state is recorded.
#[derive(Default)]
pub struct ScriptedPlatform {
    resources: Mutex<HashMap<String, Value>>,
    people_by_email: Mutex<HashMap<String, PersonId>>,
    failing_recipients: Mutex<HashSet<PersonId>>,
    failing_refresh_tokens: Mutex<HashSet<String>>,
    failing_codes: Mutex<HashSet<String>>,
    fail_webhooks: Mutex<bool>,
    sent: Mutex<Vec<SentMessage>>,
    webhook_calls: Mutex<Vec<WebhookCall>>,
    refresh_calls: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources the digest path reads for [`message_event`].
    pub fn with_message_context(self) -> Self {
        self.with_resource(
            "messages/MSG-1",
            json!({ "id": "MSG-1", "personEmail": "sender@example.com", "text": "Are you around?" }),
        )
        .with_resource("people/SENDER-PERSON-ID", json!({ "displayName": "Sam Sender" }))
        .with_resource("rooms/ROOM-1", json!({ "title": "Launch Planning" }))
    }

    pub fn with_resource(self, path: &str, body: Value) -> Self {
        lock(&self.resources).insert(path.to_owned(), body);
        self
    }

    pub fn with_person(self, email: &str, id: &str) -> Self {
        lock(&self.people_by_email).insert(email.to_owned(), PersonId::new(id));
        self
    }

    pub fn failing_send_to(self, recipient: &str) -> Self {
        lock(&self.failing_recipients).insert(PersonId::new(recipient));
        self
    }

    pub fn failing_refresh_for(self, refresh_token: &str) -> Self {
        lock(&self.failing_refresh_tokens).insert(refresh_token.to_owned());
        self
    }

    pub fn failing_code(self, code: &str) -> Self {
        lock(&self.failing_codes).insert(code.to_owned());
        self
    }

    pub fn failing_webhooks(self) -> Self {
        *lock(&self.fail_webhooks) = true;
        self
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|message| message.recipient.as_str() == recipient).collect()
    }

    pub fn webhook_calls(&self) -> Vec<WebhookCall> {
        lock(&self.webhook_calls).clone()
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        lock(&self.refresh_calls).clone()
    }
}

fn unavailable(endpoint: &str) -> PlatformError {
    PlatformError::Status { endpoint: endpoint.to_owned(), status: 503 }
}

#[async_trait]
impl MessagingPlatform for ScriptedPlatform {
    async fn lookup_person_id_by_email(
        &self,
        _token: &SecretString,
        email: &str,
    ) -> Result<PersonId, PlatformError> {
        lock(&self.people_by_email)
            .get(email)
            .cloned()
            .ok_or_else(|| PlatformError::PersonNotFound(email.to_owned()))
    }

    async fn get_field(
        &self,
        _token: &SecretString,
        resource_path: &str,
        field: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let resources = lock(&self.resources);
        let body = resources.get(resource_path).ok_or_else(|| unavailable(resource_path))?;
        let value = match field {
            Some(field) => body.get(field).cloned().unwrap_or(Value::Null),
            None => body.clone(),
        };
        let empty = matches!(&value, Value::Null) || value.as_str() == Some("");
        if empty {
            return Err(PlatformError::MissingField {
                resource: resource_path.to_owned(),
                field: field.unwrap_or_default().to_owned(),
            });
        }
        Ok(value)
    }

    async fn send_message(
        &self,
        token: &SecretString,
        recipient: &PersonId,
        markdown: &str,
    ) -> Result<(), PlatformError> {
        if lock(&self.failing_recipients).contains(recipient) {
            return Err(unavailable("messages"));
        }
        lock(&self.sent).push(SentMessage {
            token: token.expose_secret().to_owned(),
            recipient: recipient.clone(),
            markdown: markdown.to_owned(),
        });
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, PlatformError> {
        if lock(&self.failing_codes).contains(code) {
            return Err(PlatformError::Status { endpoint: "access_token".to_owned(), status: 400 });
        }
        Ok(tokens(&format!("access-{code}"), &format!("refresh-{code}")))
    }

    async fn refresh_tokens(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenPair, PlatformError> {
        let current = refresh_token.expose_secret().to_owned();
        lock(&self.refresh_calls).push(current.clone());
        if lock(&self.failing_refresh_tokens).contains(&current) {
            return Err(PlatformError::Status { endpoint: "access_token".to_owned(), status: 400 });
        }
        Ok(tokens(&format!("{current}-access-next"), &format!("{current}-next")))
    }

    async fn register_webhook(
        &self,
        token: &SecretString,
        owner: &PersonId,
    ) -> Result<(), PlatformError> {
        if *lock(&self.fail_webhooks) {
            return Err(unavailable("webhooks"));
        }
        lock(&self.webhook_calls).push(WebhookCall::Registered {
            token: token.expose_secret().to_owned(),
            owner: owner.clone(),
        });
        Ok(())
    }

    async fn deregister_webhook(&self, token: &SecretString) -> Result<(), PlatformError> {
        if *lock(&self.fail_webhooks) {
            return Err(unavailable("webhooks"));
        }
        lock(&self.webhook_calls)
            .push(WebhookCall::Deregistered { token: token.expose_secret().to_owned() });
        Ok(())
    }
}

pub struct FailingAccountRepository;

#[async_trait]
impl AccountRepository for FailingAccountRepository {
    async fn find_by_id(&self, _id: &PersonId) -> Result<Option<UserConfig>, StoreError> {
        Err(StoreError::Unavailable("account store offline".to_owned()))
    }

    async fn save(&self, _account: UserConfig) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("account store offline".to_owned()))
    }

    async fn remove(&self, _id: &PersonId) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("account store offline".to_owned()))
    }

    async fn list_ids(&self) -> Result<Vec<PersonId>, StoreError> {
        Err(StoreError::Unavailable("account store offline".to_owned()))
    }
}

pub struct FailingSuppressionRepository;

#[async_trait]
impl SuppressionRepository for FailingSuppressionRepository {
    async fn find_by_key(
        &self,
        _key: &SuppressionKey,
    ) -> Result<Option<SuppressionWindow>, StoreError> {
        Err(StoreError::Unavailable("suppression store offline".to_owned()))
    }

    async fn save(&self, _window: SuppressionWindow) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("suppression store offline".to_owned()))
    }

    async fn remove(&self, _key: &SuppressionKey) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("suppression store offline".to_owned()))
    }

    async fn list_keys(&self) -> Result<Vec<SuppressionKey>, StoreError> {
        Err(StoreError::Unavailable("suppression store offline".to_owned()))
    }
}

pub fn failing_store() -> ConfigStore {
    ConfigStore::new(Arc::new(FailingAccountRepository), Arc::new(FailingSuppressionRepository))
}

/// Accounts work, suppression windows cannot be read or written.
pub fn store_without_suppressions() -> ConfigStore {
    ConfigStore::new(
        Arc::new(InMemoryAccountRepository::default()),
        Arc::new(FailingSuppressionRepository),
    )
}
