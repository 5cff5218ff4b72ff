/**
 * Chat Error Types
 *
 * This module defines the error type shared by the chat store, the realtime
 * gateway and the REST handlers.
 *
 * # Error Categories
 *
 * ## Caller errors
 *
 * Rejected before any side effect:
 * - `Unauthorized` - missing or invalid token
 * - `Forbidden` - the caller is not a participant of the chat
 * - `NotFound` - unknown chat
 * - `InvalidContent` - empty or oversized message
 * - `InvalidParticipant` - self-chat or unknown target user
 * - `BadRequest` - malformed request or frame
 *
 * ## Store errors
 *
 * - `StoreUnavailable` - the store did not answer within its time budget
 * - `Database` - the underlying database failed; reported as `StoreUnavailable`
 */

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::shared::ErrorCode;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("User {user_id} is not a participant of chat {chat_id}")]
    Forbidden { chat_id: Uuid, user_id: Uuid },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid content: {message}")]
    InvalidContent { message: String },

    #[error("Invalid participant: {message}")]
    InvalidParticipant { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(chat_id: Uuid, user_id: Uuid) -> Self {
        Self::Forbidden { chat_id, user_id }
    }

    pub fn chat_not_found(chat_id: Uuid) -> Self {
        Self::NotFound {
            what: format!("chat {}", chat_id),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }

    pub fn invalid_participant(message: impl Into<String>) -> Self {
        Self::InvalidParticipant {
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Wire code reported to clients
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidContent { .. } => ErrorCode::InvalidContent,
            Self::InvalidParticipant { .. } => ErrorCode::InvalidParticipant,
            Self::StoreUnavailable { .. } | Self::Database(_) => ErrorCode::StoreUnavailable,
            Self::BadRequest { .. } | Self::Serialization(_) => ErrorCode::BadRequest,
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `Unauthorized` - 401
    /// - `Forbidden` - 403
    /// - `NotFound` - 404
    /// - `InvalidContent`, `InvalidParticipant` - 422
    /// - `StoreUnavailable`, `Database` - 503
    /// - `BadRequest` - 400
    /// - `Serialization` - 500
    pub fn status_code(&self) -> StatusCode {
        if let Self::Serialization(_) = self {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        match self.code() {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidContent | ErrorCode::InvalidParticipant => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the client. Database internals are not leaked.
    pub fn client_message(&self) -> String {
        match self {
            Self::Database(_) => "The chat store is temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
