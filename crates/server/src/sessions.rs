//! In-memory login sessions keyed by an opaque cookie value. Expiry slides
//! forward on every successful lookup.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use autoresponder_core::domain::PersonId;
use autoresponder_core::platform::Clock;

pub const SESSION_COOKIE: &str = "autoresponder_session";
const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct Session {
    pub person_id: PersonId,
    pub display_name: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let ttl = Duration::seconds(ttl_secs.clamp(1, MAX_TTL_SECS) as i64);
        Self { entries: Arc::new(RwLock::new(HashMap::new())), ttl, clock }
    }

    /// Opens a session and returns its id.
    pub async fn open(&self, person_id: PersonId, display_name: String) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session { person_id, display_name, expires_at: self.clock.now() + self.ttl };
        let mut entries = self.entries.write().await;
        let now = self.clock.now();
        entries.retain(|_, existing| existing.expires_at > now);
        entries.insert(id.clone(), session);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                Some(session.clone())
            }
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn destroy(&self, id: &str) {
        self.entries.write().await.remove(id);
    }

    /// Looks up the session named by the request's cookie.
    pub async fn from_headers(&self, headers: &HeaderMap) -> Option<(String, Session)> {
        let id = session_id(headers)?;
        let session = self.get(&id).await?;
        Some((id, session))
    }

    /// Cookie for `id` whose `Max-Age` matches the sliding expiry; re-issued on
    /// every authenticated response.
    pub fn set_cookie(&self, id: &str) -> HeaderValue {
        let cookie = format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.ttl.num_seconds()
        );
        HeaderValue::from_str(&cookie)
            .unwrap_or_else(|_| HeaderValue::from_static("autoresponder_session=; Path=/"))
    }

    pub fn clear_cookie() -> HeaderValue {
        HeaderValue::from_static("autoresponder_session=; Path=/; HttpOnly; Max-Age=0")
    }
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}
