/**
 * Message History Handler
 *
 * `GET /chats/{chat_id}/messages?page&limit` returns one page of history,
 * oldest-to-newest within the page. Page 1 is the newest page.
 */

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::chat::ChatStore;
use crate::backend::error::ChatResult;
use crate::backend::middleware::AuthUser;
use crate::shared::{Message, Pagination};

pub async fn get_messages(
    State(store): State<Arc<dyn ChatStore>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> ChatResult<Json<Vec<Message>>> {
    let messages = store
        .get_messages(chat_id, user.id, pagination.normalized())
        .await?;
    Ok(Json(messages))
}
