/**
 * Chat List Handlers
 *
 * # Routes
 *
 * - `GET /chats` - chats of the authenticated user, most recent activity first
 * - `POST /chats/direct` - get or create the direct chat with another user
 * - `POST /chats/group` - create a named group chat
 * - `POST /chats/{chat_id}/read` - reset the caller's unread counter
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::chat::ChatStore;
use crate::backend::error::ChatResult;
use crate::backend::middleware::AuthUser;
use crate::shared::Chat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectChatRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupChatRequest {
    pub chat_name: String,
    pub participants: Vec<Uuid>,
}

pub async fn list_chats(
    State(store): State<Arc<dyn ChatStore>>,
    AuthUser(user): AuthUser,
) -> ChatResult<Json<Vec<Chat>>> {
    let chats = store.get_chats_for_user(user.id).await?;
    tracing::debug!("[Server] {} chats for {}", chats.len(), user.id);
    Ok(Json(chats))
}

/// Idempotent: calling twice with the same pair, in either direction,
/// returns the same chat.
pub async fn create_direct_chat(
    State(store): State<Arc<dyn ChatStore>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateDirectChatRequest>,
) -> ChatResult<Json<Chat>> {
    let chat = store.create_direct_chat(user.id, request.user_id).await?;
    Ok(Json(chat))
}

pub async fn create_group_chat(
    State(store): State<Arc<dyn ChatStore>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateGroupChatRequest>,
) -> ChatResult<(StatusCode, Json<Chat>)> {
    let chat = store
        .create_group_chat(user.id, &request.chat_name, &request.participants)
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn mark_read(
    State(store): State<Arc<dyn ChatStore>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<Uuid>,
) -> ChatResult<Json<Chat>> {
    let chat = store.mark_read(chat_id, user.id).await?;
    Ok(Json(chat))
}
