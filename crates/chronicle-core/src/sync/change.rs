//! Change records and their encrypted envelopes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::storage::Entry;

/// Entity name for log entries. Other entity names are ignored on apply.
pub const ENTITY_ENTRY: &str = "entry";

/// Version tag bound into every envelope's associated data.
const AAD_PREFIX: &str = "chronicle/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upsert,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Upsert => write!(f, "upsert"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// A local mutation as replicated to other devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub change_id: Uuid,
    pub entity: String,
    pub entity_id: String,
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Tombstone flag; when set the change is a delete whatever `op` says.
    #[serde(default)]
    pub deleted: bool,
    pub ts: DateTime<Utc>,
}

impl Change {
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        op: Operation,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            op,
            payload,
            deleted: op == Operation::Delete,
            ts: Utc::now(),
        }
    }

    /// Change for an entry: upserts carry the full entry, deletes carry
    /// nothing.
    pub fn for_entry(entry: &Entry, op: Operation) -> Result<Self> {
        let payload = match op {
            Operation::Upsert => Some(serde_json::to_value(EntryPayload::from(entry))?),
            Operation::Delete => None,
        };
        Ok(Self::new(ENTITY_ENTRY, entry.id.to_string(), op, payload))
    }

    pub fn is_delete(&self) -> bool {
        self.deleted || self.op == Operation::Delete
    }
}

/// Replicated fields of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub id: String,
    /// RFC 3339 on write; integer Unix seconds are accepted on read.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&Entry> for EntryPayload {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.to_string(),
            timestamp: entry.timestamp,
            message: entry.message.clone(),
            hostname: entry.hostname.clone(),
            username: entry.username.clone(),
            working_directory: entry.working_directory.clone(),
            tags: entry.tags.clone(),
        }
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs))),
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
    }
}

/// Encrypted change plus the routing fields needed to open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub change_id: Uuid,
    pub entity: String,
    pub entity_id: String,
    pub device_id: Uuid,
    pub ts: DateTime<Utc>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Associated data binding the ciphertext to its routing fields.
    pub fn aad(&self, user_id: &str) -> Vec<u8> {
        associated_data(user_id, &self.device_id, &self.change_id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ChronicleError::Validation(format!("Malformed envelope: {}", e)))
    }
}

pub fn associated_data(user_id: &str, device_id: &Uuid, change_id: &Uuid) -> Vec<u8> {
    format!("{}|{}|{}|{}", AAD_PREFIX, user_id, device_id, change_id).into_bytes()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
