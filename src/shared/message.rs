/**
 * Chat Message Data Structure
 *
 * A message is an append-only record owned by exactly one chat. Messages are
 * never edited or deleted once the store has accepted them.
 *
 * # Ordering
 *
 * Within a chat, messages are ordered by `created_at` and then by `sequence`,
 * the per-chat insertion counter assigned by the store. The store never hands
 * out a `created_at` older than the previous message of the same chat, so the
 * two keys always agree.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Tag describing how a message's content should be interpreted.
///
/// Only `text` is produced by current clients. Any other tag is kept as-is so
/// newer clients can introduce types without a server change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MessageType {
    #[default]
    Text,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Other(tag) => tag.as_str(),
        }
    }

    /// Parse a stored or wire tag. Blank tags fall back to `text`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "" | "text" => MessageType::Text,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(MessageType::parse(&tag))
    }
}

/// A persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: Uuid,
    /// Owning chat
    pub chat_id: Uuid,
    /// User who sent the message
    pub sender: Uuid,
    /// Trimmed, non-empty text payload
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    /// Per-chat insertion sequence, starting at 1
    pub sequence: i64,
    /// Server-assigned timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message with a fresh ID. The caller (the store) is responsible
    /// for `sequence` and `created_at` being monotonic within the chat.
    pub fn new(
        chat_id: Uuid,
        sender: Uuid,
        content: String,
        message_type: MessageType,
        sequence: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            sender,
            content,
            message_type,
            sequence,
            created_at,
        }
    }

    /// Causal order inside a chat: timestamp first, insertion sequence second.
    pub fn causal_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then(self.sequence.cmp(&other.sequence))
    }

    /// Get a preview of the message content (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let cut: String = self.content.chars().take(max_len).collect();
            format!("{}...", cut)
        }
    }
}
