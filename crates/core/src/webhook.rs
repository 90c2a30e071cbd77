//! Structural and signature verification of inbound webhook notifications.
//! Nothing here performs I/O.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha1::Sha1;
use thiserror::Error;

use crate::domain::{EventData, EventKind, InboundEvent, PersonId, Resource};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-spark-signature";

/// Length of the per-account signing secret, taken from the end of the owner id.
pub const SECRET_SUFFIX_LEN: usize = 15;

const REQUIRED_FIELDS: [&str; 8] =
    ["id", "name", "created", "targetUrl", "resource", "event", "actorId", "data"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("unsupported event `{resource}/{event}`")]
    UnsupportedEvent { resource: String, event: String },
    #[error("webhook signature does not match")]
    SignatureMismatch,
}

impl VerifyError {
    /// Short label used in rejection bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedPayload(_) => "malformed_payload",
            Self::UnsupportedEvent { .. } => "unsupported_event",
            Self::SignatureMismatch => "signature_mismatch",
        }
    }
}

/// Checks the envelope shape and the resource/event allow-list, then extracts
/// the typed event.
pub fn verify_envelope(payload: &Value) -> Result<InboundEvent, VerifyError> {
    let Value::Object(envelope) = payload else {
        return Err(VerifyError::MalformedPayload("payload must be a JSON object".to_owned()));
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| envelope.get(*field).map_or(true, is_blank))
        .collect();
    if !missing.is_empty() {
        return Err(VerifyError::MalformedPayload(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let raw_resource = text(envelope.get("resource"));
    let raw_event = text(envelope.get("event"));
    let unsupported = || VerifyError::UnsupportedEvent {
        resource: raw_resource.to_owned(),
        event: raw_event.to_owned(),
    };
    let resource = Resource::parse(raw_resource).ok_or_else(unsupported)?;
    let event = EventKind::parse(raw_event).ok_or_else(unsupported)?;
    if matches!(
        (resource, event),
        (Resource::Messages, EventKind::Updated) | (Resource::Rooms, EventKind::Deleted)
    ) {
        return Err(unsupported());
    }

    let created_by = text(envelope.get("createdBy"));
    if created_by.is_empty() {
        return Err(VerifyError::MalformedPayload(
            "createdBy is required to check the signature".to_owned(),
        ));
    }

    let data = envelope.get("data").cloned().unwrap_or(Value::Null);
    let data: EventData = serde_json::from_value(data)
        .map_err(|error| VerifyError::MalformedPayload(format!("invalid data: {error}")))?;

    Ok(InboundEvent {
        id: text(envelope.get("id")).to_owned(),
        resource,
        event,
        actor_id: PersonId::new(text(envelope.get("actorId"))),
        created_by: PersonId::new(created_by),
        data,
    })
}

/// Signing secret registered for `owner_id`: its last 15 characters.
pub fn webhook_secret(owner_id: &str) -> &str {
    let skip = owner_id.chars().count().saturating_sub(SECRET_SUFFIX_LEN);
    match owner_id.char_indices().nth(skip) {
        Some((offset, _)) => &owner_id[offset..],
        None => owner_id,
    }
}

pub fn compute_signature(body: &[u8], owner: &PersonId) -> Result<String, VerifyError> {
    Ok(hex::encode(signing_mac(body, owner)?.finalize().into_bytes()))
}

/// Compares the hex digest from the signature header against
/// HMAC-SHA1(secret, raw body) in constant time.
pub fn verify_signature(
    body: &[u8],
    owner: &PersonId,
    signature: Option<&str>,
) -> Result<(), VerifyError> {
    let provided = signature
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(VerifyError::SignatureMismatch)?;
    let provided = hex::decode(provided).map_err(|_| VerifyError::SignatureMismatch)?;

    signing_mac(body, owner)?
        .verify_slice(&provided)
        .map_err(|_| VerifyError::SignatureMismatch)
}

fn signing_mac(body: &[u8], owner: &PersonId) -> Result<HmacSha1, VerifyError> {
    let secret = webhook_secret(owner.as_str());
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| VerifyError::SignatureMismatch)?;
    mac.update(body);
    Ok(mac)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn text(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or_default()
}
