/**
 * Chat Store
 *
 * The store is the only writer of persisted chat state. Every implementation
 * must guarantee:
 *
 * - one direct chat per unordered pair of users
 * - appends to the same chat are serialised, so `sequence` and `created_at`
 *   never go backwards within a chat
 * - a message insert, the `last_message` cache and the unread counters are
 *   updated as one unit, or not at all
 *
 * Authorisation is enforced here as well as in the gateway: a store called
 * directly still refuses non-participants.
 */

use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::backend::error::{ChatError, ChatResult};
use crate::shared::{Chat, Message, MessageType, Pagination};

/// Longest accepted message, in characters
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 5000;

/// A successful append: the stored message and the chat as it looks right after it
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub message: Message,
    pub chat: Chat,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Chats `user_id` participates in, most recent activity first
    async fn get_chats_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Chat>>;

    async fn get_chat(&self, chat_id: Uuid) -> ChatResult<Chat>;

    /// Return the direct chat between the two users, creating it if needed.
    ///
    /// Fails with `InvalidParticipant` when both IDs are equal or the other
    /// user does not exist.
    async fn create_direct_chat(&self, user_id: Uuid, other_user_id: Uuid) -> ChatResult<Chat>;

    /// Create a named group chat. The creator is always a participant.
    async fn create_group_chat(
        &self,
        creator_id: Uuid,
        chat_name: &str,
        participants: &[Uuid],
    ) -> ChatResult<Chat>;

    /// One page of history, oldest-to-newest within the page
    async fn get_messages(
        &self,
        chat_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ChatResult<Vec<Message>>;

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> ChatResult<AppendOutcome>;

    /// Reset `user_id`'s unread counter. Idempotent.
    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<Chat>;

    /// Every other user who shares at least one chat with `user_id`
    async fn shared_contacts(&self, user_id: Uuid) -> ChatResult<BTreeSet<Uuid>> {
        let contacts = self
            .get_chats_for_user(user_id)
            .await?
            .into_iter()
            .flat_map(|chat| chat.participants.into_iter())
            .filter(|participant| *participant != user_id)
            .collect();
        Ok(contacts)
    }
}

/// Trim and bound message content
pub fn validate_content(content: &str, max_len: usize) -> ChatResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::invalid_content("message content cannot be empty"));
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(ChatError::invalid_content(format!(
            "message is {} characters, the limit is {}",
            len, max_len
        )));
    }
    Ok(trimmed.to_string())
}

/// Reject self-chats before touching any storage
pub fn validate_direct_pair(user_id: Uuid, other_user_id: Uuid) -> ChatResult<()> {
    if user_id == other_user_id {
        return Err(ChatError::invalid_participant(
            "cannot start a direct chat with yourself",
        ));
    }
    Ok(())
}

/// Normalise a group request into (trimmed name, participant set incl. creator)
pub fn validate_group(
    creator_id: Uuid,
    chat_name: &str,
    participants: &[Uuid],
) -> ChatResult<(String, BTreeSet<Uuid>)> {
    let name = chat_name.trim();
    if name.is_empty() {
        return Err(ChatError::bad_request("group chats need a name"));
    }

    let mut members: BTreeSet<Uuid> = participants.iter().copied().collect();
    members.insert(creator_id);
    if members.len() < 2 {
        return Err(ChatError::invalid_participant(
            "a group chat needs at least one other participant",
        ));
    }
    Ok((name.to_string(), members))
}

/// Sort a chat list by most recent activity, newest first
pub fn sort_by_activity(chats: &mut [Chat]) {
    chats.sort_by(|a, b| {
        b.last_activity()
            .cmp(&a.last_activity())
            .then_with(|| a.id.cmp(&b.id))
    });
}
