//! Chat Data Structure
//!
//! A chat is either a direct (two-party) or a group conversation. It owns its
//! participant set, a denormalised copy of the latest message for list
//! rendering, and a per-participant unread counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::message::Message;

/// Number of characters of the latest message kept on the chat
pub const LAST_MESSAGE_PREVIEW_LEN: usize = 100;

/// Cached summary of the most recent message in a chat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: Uuid,
    /// Content snippet, at most `LAST_MESSAGE_PREVIEW_LEN` characters plus an ellipsis
    pub content: String,
    pub sender: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            content: message.preview(LAST_MESSAGE_PREVIEW_LEN),
            sender: message.sender,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub is_group_chat: bool,
    /// Only set for group chats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    pub participants: BTreeSet<Uuid>,
    pub last_message: Option<LastMessage>,
    pub unread_counts: BTreeMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Create a direct chat between two users
    pub fn new_direct(user_id: Uuid, other_user_id: Uuid) -> Self {
        Self::with_participants(false, None, [user_id, other_user_id])
    }

    /// Create a named group chat
    pub fn new_group(chat_name: String, participants: impl IntoIterator<Item = Uuid>) -> Self {
        Self::with_participants(true, Some(chat_name), participants)
    }

    fn with_participants(
        is_group_chat: bool,
        chat_name: Option<String>,
        participants: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        let participants: BTreeSet<Uuid> = participants.into_iter().collect();
        let unread_counts = participants.iter().map(|p| (*p, 0)).collect();
        Self {
            id: Uuid::new_v4(),
            is_group_chat,
            chat_name,
            participants,
            last_message: None,
            unread_counts,
            created_at: Utc::now(),
        }
    }

    /// Check if user is a participant
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// Timestamp used to order a user's chat list
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }

    pub fn unread_count(&self, user_id: Uuid) -> u32 {
        self.unread_counts.get(&user_id).copied().unwrap_or(0)
    }

    /// Record an accepted message: refresh the cache and bump every other
    /// participant's unread counter.
    pub fn record_message(&mut self, message: &Message) {
        self.last_message = Some(LastMessage::from(message));
        for participant in &self.participants {
            if *participant != message.sender {
                *self.unread_counts.entry(*participant).or_insert(0) += 1;
            }
        }
    }

    pub fn mark_read(&mut self, user_id: Uuid) {
        self.unread_counts.insert(user_id, 0);
    }
}

/// Canonical key for the direct chat between two users, independent of order
pub fn direct_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
