//! Shared Module
//!
//! This module contains types that cross the wire between the chat server
//! and its clients: the chat and message records returned by the REST API,
//! the realtime protocol frames, and the error codes both surfaces report.
//!
//! Everything here is plain data with serde derives and no server
//! dependencies, so a client crate can depend on it without pulling in the
//! backend.

/// Chat record and last-message cache
pub mod chat;

/// Message record
pub mod message;

/// Realtime protocol frames
pub mod event;

/// Wire error codes
pub mod error;

/// Message history paging
pub mod pagination;

/// Re-export commonly used types for convenience
pub use chat::{Chat, LastMessage};
pub use error::ErrorCode;
pub use event::{ClientCommand, ServerEvent};
pub use message::{Message, MessageType};
pub use pagination::Pagination;
