//! In-memory chat store
//!
//! Each chat lives in its own `Mutex`-guarded record; an index behind a
//! `RwLock` maps chat IDs, direct-chat pairs and users to records. Appends
//! lock only the target chat's record, so two chats never wait on each other
//! while two senders to the same chat are applied one after the other.
//!
//! Lock order is always index, then record, and the index guard is released
//! before any record is held for a mutation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::store::{
    sort_by_activity, validate_content, validate_direct_pair, validate_group, AppendOutcome,
    ChatStore, DEFAULT_MAX_MESSAGE_LEN,
};
use crate::backend::auth::UserDirectory;
use crate::backend::error::{ChatError, ChatResult};
use crate::shared::chat::direct_key;
use crate::shared::{Chat, Message, MessageType, Pagination};

#[derive(Debug)]
struct ChatRecord {
    chat: Chat,
    /// Insertion order, which is also causal order
    messages: Vec<Message>,
}

#[derive(Default)]
struct StoreIndex {
    chats: HashMap<Uuid, Arc<Mutex<ChatRecord>>>,
    direct_chats: HashMap<(Uuid, Uuid), Uuid>,
    by_user: HashMap<Uuid, BTreeSet<Uuid>>,
}

impl StoreIndex {
    fn insert(&mut self, chat: Chat) {
        for participant in &chat.participants {
            self.by_user.entry(*participant).or_default().insert(chat.id);
        }
        let chat_id = chat.id;
        let record = Arc::new(Mutex::new(ChatRecord {
            chat,
            messages: Vec::new(),
        }));
        self.chats.insert(chat_id, record);
    }
}

pub struct MemoryChatStore {
    index: RwLock<StoreIndex>,
    directory: Arc<dyn UserDirectory>,
    max_message_len: usize,
}

impl MemoryChatStore {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            index: RwLock::new(StoreIndex::default()),
            directory,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    async fn record(&self, chat_id: Uuid) -> ChatResult<Arc<Mutex<ChatRecord>>> {
        self.index
            .read()
            .await
            .chats
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| ChatError::chat_not_found(chat_id))
    }

    async fn require_user(&self, user_id: Uuid) -> ChatResult<()> {
        if self.directory.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(ChatError::invalid_participant(format!(
                "user {} does not exist",
                user_id
            )))
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_chats_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Chat>> {
        let records: Vec<_> = {
            let index = self.index.read().await;
            index
                .by_user
                .get(&user_id)
                .map(|ids| ids.iter().filter_map(|id| index.chats.get(id).cloned()).collect())
                .unwrap_or_default()
        };

        let mut chats = Vec::with_capacity(records.len());
        for record in records {
            chats.push(record.lock().await.chat.clone());
        }
        sort_by_activity(&mut chats);
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: Uuid) -> ChatResult<Chat> {
        let record = self.record(chat_id).await?;
        let chat = record.lock().await.chat.clone();
        Ok(chat)
    }

    async fn create_direct_chat(&self, user_id: Uuid, other_user_id: Uuid) -> ChatResult<Chat> {
        validate_direct_pair(user_id, other_user_id)?;
        self.require_user(other_user_id).await?;

        let key = direct_key(user_id, other_user_id);
        let mut index = self.index.write().await;
        if let Some(existing) = index.direct_chats.get(&key).and_then(|id| index.chats.get(id)) {
            let chat = existing.lock().await.chat.clone();
            tracing::debug!("[Store] Reusing direct chat {}", chat.id);
            return Ok(chat);
        }

        let chat = Chat::new_direct(user_id, other_user_id);
        index.direct_chats.insert(key, chat.id);
        index.insert(chat.clone());
        tracing::info!(
            "[Store] Created direct chat {} between {} and {}",
            chat.id,
            user_id,
            other_user_id
        );
        Ok(chat)
    }

    async fn create_group_chat(
        &self,
        creator_id: Uuid,
        chat_name: &str,
        participants: &[Uuid],
    ) -> ChatResult<Chat> {
        let (name, members) = validate_group(creator_id, chat_name, participants)?;
        for member in members.iter().filter(|m| **m != creator_id) {
            self.require_user(*member).await?;
        }

        let chat = Chat::new_group(name, members);
        self.index.write().await.insert(chat.clone());
        tracing::info!(
            "[Store] Created group chat {} with {} participants",
            chat.id,
            chat.participants.len()
        );
        Ok(chat)
    }

    async fn get_messages(
        &self,
        chat_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ChatResult<Vec<Message>> {
        let record = self.record(chat_id).await?;
        let record = record.lock().await;
        if !record.chat.has_participant(viewer_id) {
            return Err(ChatError::forbidden(chat_id, viewer_id));
        }

        let end = record.messages.len().saturating_sub(pagination.offset());
        let start = end.saturating_sub(pagination.limit());
        Ok(record.messages[start..end].to_vec())
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> ChatResult<AppendOutcome> {
        let record = self.record(chat_id).await?;
        let mut record = record.lock().await;
        if !record.chat.has_participant(sender_id) {
            return Err(ChatError::forbidden(chat_id, sender_id));
        }
        let content = validate_content(content, self.max_message_len)?;

        let created_at = match record.messages.last() {
            Some(previous) => Utc::now().max(previous.created_at),
            None => Utc::now(),
        };
        let sequence = record.messages.len() as i64 + 1;
        let message = Message::new(chat_id, sender_id, content, message_type, sequence, created_at);

        record.chat.record_message(&message);
        record.messages.push(message.clone());
        tracing::debug!(
            "[Store] Appended message #{} to chat {}",
            sequence,
            chat_id
        );

        Ok(AppendOutcome {
            message,
            chat: record.chat.clone(),
        })
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<Chat> {
        let record = self.record(chat_id).await?;
        let mut record = record.lock().await;
        if !record.chat.has_participant(user_id) {
            return Err(ChatError::forbidden(chat_id, user_id));
        }
        record.chat.mark_read(user_id);
        Ok(record.chat.clone())
    }
}
