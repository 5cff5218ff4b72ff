/**
 * PostgreSQL Chat Store
 *
 * This module persists chats, participants and messages to PostgreSQL.
 *
 * # Atomicity
 *
 * An append runs in one transaction: the chat row is locked `FOR UPDATE`
 * (serialising appends to that chat), the message is inserted with the next
 * `message_seq`, and the last-message columns and unread counters are updated
 * before commit. Any failure rolls back all three.
 *
 * # Direct chats
 *
 * `chats.direct_key` holds `"<lower uuid>:<higher uuid>"` for direct chats and
 * is `UNIQUE`, so concurrent creations of the same pair converge on one row.
 */

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::store::{
    validate_content, validate_direct_pair, validate_group, AppendOutcome, ChatStore,
    DEFAULT_MAX_MESSAGE_LEN,
};
use crate::backend::error::{ChatError, ChatResult};
use crate::shared::chat::{direct_key, LastMessage};
use crate::shared::{Chat, Message, MessageType, Pagination};

pub struct PgChatStore {
    pool: PgPool,
    max_message_len: usize,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    async fn require_user(&self, user_id: Uuid) -> ChatResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(ChatError::invalid_participant(format!(
                "user {} does not exist",
                user_id
            )))
        }
    }

    async fn load(&self, chat_id: Uuid) -> ChatResult<Chat> {
        let mut conn = self.pool.acquire().await?;
        load_chat(&mut conn, chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))
    }
}

/// `timestamptz` keeps microseconds; truncate before binding so the value
/// handed back to callers equals the one read later
fn db_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

fn direct_key_string(a: Uuid, b: Uuid) -> String {
    let (low, high) = direct_key(a, b);
    format!("{}:{}", low, high)
}

fn chat_from_rows(row: &PgRow, participants: &[PgRow]) -> Chat {
    let last_message = row
        .get::<Option<Uuid>, _>("last_message_id")
        .map(|message_id| LastMessage {
            message_id,
            content: row
                .get::<Option<String>, _>("last_message_content")
                .unwrap_or_default(),
            sender: row
                .get::<Option<Uuid>, _>("last_message_sender")
                .unwrap_or_default(),
            created_at: row
                .get::<Option<DateTime<Utc>>, _>("last_message_at")
                .unwrap_or_else(|| row.get("created_at")),
        });

    let mut unread_counts = BTreeMap::new();
    let mut members = BTreeSet::new();
    for participant in participants {
        let user_id: Uuid = participant.get("user_id");
        let unread: i32 = participant.get("unread_count");
        members.insert(user_id);
        unread_counts.insert(user_id, unread.max(0) as u32);
    }

    Chat {
        id: row.get("id"),
        is_group_chat: row.get("is_group_chat"),
        chat_name: row.get("chat_name"),
        participants: members,
        last_message,
        unread_counts,
        created_at: row.get("created_at"),
    }
}

fn message_from_row(row: &PgRow) -> Message {
    let message_type: String = row.get("message_type");
    Message {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        sender: row.get("sender_id"),
        content: row.get("content"),
        message_type: MessageType::parse(&message_type),
        sequence: row.get("seq"),
        created_at: row.get("created_at"),
    }
}

async fn load_chat(conn: &mut PgConnection, chat_id: Uuid) -> Result<Option<Chat>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, is_group_chat, chat_name, last_message_id, last_message_content,
               last_message_sender, last_message_at, created_at
        FROM chats
        WHERE id = $1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let participants = sqlx::query(
        r#"
        SELECT user_id, unread_count
        FROM chat_participants
        WHERE chat_id = $1
        "#,
    )
    .bind(chat_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(chat_from_rows(&row, &participants)))
}

async fn insert_participants(
    conn: &mut PgConnection,
    chat_id: Uuid,
    members: &BTreeSet<Uuid>,
) -> Result<(), sqlx::Error> {
    for member in members {
        sqlx::query(
            r#"
            INSERT INTO chat_participants (chat_id, user_id, unread_count)
            VALUES ($1, $2, 0)
            "#,
        )
        .bind(chat_id)
        .bind(member)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn get_chats_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Chat>> {
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT c.id
            FROM chats c
            INNER JOIN chat_participants p ON p.chat_id = c.id
            WHERE p.user_id = $1
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC, c.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut chats = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chat) = load_chat(&mut conn, id).await? {
                chats.push(chat);
            }
        }
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: Uuid) -> ChatResult<Chat> {
        self.load(chat_id).await
    }

    async fn create_direct_chat(&self, user_id: Uuid, other_user_id: Uuid) -> ChatResult<Chat> {
        validate_direct_pair(user_id, other_user_id)?;
        self.require_user(other_user_id).await?;

        let key = direct_key_string(user_id, other_user_id);
        let mut candidate = Chat::new_direct(user_id, other_user_id);
        candidate.created_at = db_timestamp(candidate.created_at);

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO chats (id, is_group_chat, chat_name, direct_key, message_seq, created_at)
            VALUES ($1, false, NULL, $2, 0, $3)
            ON CONFLICT (direct_key) DO NOTHING
            "#,
        )
        .bind(candidate.id)
        .bind(&key)
        .bind(candidate.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 1 {
            insert_participants(&mut tx, candidate.id, &candidate.participants).await?;
            tx.commit().await?;
            tracing::info!("[Store] Created direct chat {}", candidate.id);
            return Ok(candidate);
        }
        tx.rollback().await?;

        let existing: Uuid = sqlx::query_scalar("SELECT id FROM chats WHERE direct_key = $1")
            .bind(&key)
            .fetch_one(&self.pool)
            .await?;
        tracing::debug!("[Store] Reusing direct chat {}", existing);
        self.load(existing).await
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
        let mut chat = Chat::new_group(name, members);
        chat.created_at = db_timestamp(chat.created_at);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO chats (id, is_group_chat, chat_name, direct_key, message_seq, created_at)
            VALUES ($1, true, $2, NULL, 0, $3)
            "#,
        )
        .bind(chat.id)
        .bind(&chat.chat_name)
        .bind(chat.created_at)
        .execute(&mut *tx)
        .await?;
        insert_participants(&mut tx, chat.id, &chat.participants).await?;
        tx.commit().await?;

        tracing::info!("[Store] Created group chat {}", chat.id);
        Ok(chat)
    }

    async fn get_messages(
        &self,
        chat_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ChatResult<Vec<Message>> {
        let chat = self.load(chat_id).await?;
        if !chat.has_participant(viewer_id) {
            return Err(ChatError::forbidden(chat_id, viewer_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, sender_id, content, message_type, seq, created_at
            FROM chat_messages
            WHERE chat_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chat_id)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> ChatResult<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        let head = sqlx::query(
            r#"
            SELECT message_seq, last_message_at
            FROM chats
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ChatError::chat_not_found(chat_id))?;

        let is_participant: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM chat_participants WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(chat_id)
        .bind(sender_id)
        .fetch_one(&mut *tx)
        .await?;
        if !is_participant {
            return Err(ChatError::forbidden(chat_id, sender_id));
        }
        let content = validate_content(content, self.max_message_len)?;

        let previous_seq: i64 = head.get("message_seq");
        let previous_at: Option<DateTime<Utc>> = head.get("last_message_at");
        let created_at = db_timestamp(previous_at.map_or_else(Utc::now, |at| Utc::now().max(at)));
        let message = Message::new(
            chat_id,
            sender_id,
            content,
            message_type,
            previous_seq + 1,
            created_at,
        );
        let cached = LastMessage::from(&message);

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, chat_id, sender_id, content, message_type, seq, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.id)
        .bind(chat_id)
        .bind(sender_id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.sequence)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE chats
            SET message_seq = $2,
                last_message_id = $3,
                last_message_content = $4,
                last_message_sender = $5,
                last_message_at = $6
            WHERE id = $1
            "#,
        )
        .bind(chat_id)
        .bind(message.sequence)
        .bind(cached.message_id)
        .bind(&cached.content)
        .bind(cached.sender)
        .bind(cached.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE chat_participants
            SET unread_count = unread_count + 1
            WHERE chat_id = $1 AND user_id <> $2
            "#,
        )
        .bind(chat_id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

        let chat = load_chat(&mut tx, chat_id)
            .await?
            .ok_or_else(|| ChatError::chat_not_found(chat_id))?;
        tx.commit().await?;

        tracing::debug!(
            "[Store] Appended message #{} to chat {}",
            message.sequence,
            chat_id
        );
        Ok(AppendOutcome { message, chat })
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<Chat> {
        let updated = sqlx::query(
            r#"
            UPDATE chat_participants
            SET unread_count = 0
            WHERE chat_id = $1 AND user_id = $2
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let chat = self.load(chat_id).await?;
        if updated.rows_affected() == 0 {
            return Err(ChatError::forbidden(chat_id, user_id));
        }
        Ok(chat)
    }

    async fn shared_contacts(&self, user_id: Uuid) -> ChatResult<BTreeSet<Uuid>> {
        let contacts: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT other.user_id
            FROM chat_participants mine
            INNER JOIN chat_participants other ON other.chat_id = mine.chat_id
            WHERE mine.user_id = $1 AND other.user_id <> $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts.into_iter().collect())
    }
}
