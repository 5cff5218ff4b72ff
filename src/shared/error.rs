//! Shared Error Codes
//!
//! Machine-readable failure codes reported to clients, both in REST error
//! bodies and in the socket `error` event. The server-side error type lives in
//! `backend::error`; this enum is the part of it that crosses the wire.
//!
//! # Usage
//!
//! ```rust
//! use failfixes_chat::shared::error::ErrorCode;
//!
//! assert!(ErrorCode::StoreUnavailable.is_retryable());
//! assert!(!ErrorCode::Forbidden.is_retryable());
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy shared by the REST API and the realtime protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Missing or invalid bearer token
    Unauthorized,
    /// Acting on a chat the caller does not participate in
    Forbidden,
    /// Unknown chat or message
    NotFound,
    /// Empty or oversized message content
    InvalidContent,
    /// Self-chat, unknown target user, or an unusable participant list
    InvalidParticipant,
    /// Persistence timed out or failed; the client may retry
    StoreUnavailable,
    /// Malformed request or socket frame
    BadRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "notFound",
            ErrorCode::InvalidContent => "invalidContent",
            ErrorCode::InvalidParticipant => "invalidParticipant",
            ErrorCode::StoreUnavailable => "storeUnavailable",
            ErrorCode::BadRequest => "badRequest",
        }
    }

    /// Only store outages are worth resending; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::StoreUnavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
