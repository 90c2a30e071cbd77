use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::account::PersonId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Memberships,
    Messages,
    Rooms,
}

impl Resource {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "memberships" => Some(Self::Memberships),
            "messages" => Some(Self::Messages),
            "rooms" => Some(Self::Rooms),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memberships => "memberships",
            Self::Messages => "messages",
            Self::Rooms => "rooms",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Deleted,
    Updated,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "deleted" => Some(Self::Deleted),
            "updated" => Some(Self::Updated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Updated => "updated",
        }
    }
}

/// Anything other than `group` is handled as a one-to-one conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Group,
    #[serde(other)]
    Direct,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub room_type: Option<RoomType>,
    #[serde(default)]
    pub person_id: Option<PersonId>,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub mentioned_people: Vec<PersonId>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub mentioned_groups: Vec<String>,
}

/// `null` or a non-array reads as empty; entries of the wrong shape are dropped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };
    Ok(entries.into_iter().filter_map(|entry| serde_json::from_value(entry).ok()).collect())
}

/// A webhook notification that passed structural verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: String,
    pub resource: Resource,
    pub event: EventKind,
    pub actor_id: PersonId,
    /// Owner of the webhook, i.e. the account the notification is delivered for.
    pub created_by: PersonId,
    pub data: EventData,
}

impl InboundEvent {
    pub fn is_group_room(&self) -> bool {
        matches!(self.data.room_type, Some(RoomType::Group))
    }

    pub fn is_new_message(&self) -> bool {
        self.resource == Resource::Messages && self.event == EventKind::Created
    }
}
