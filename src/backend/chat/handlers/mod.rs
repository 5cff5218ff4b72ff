//! Chat REST Handlers
//!
//! The REST collaborators of the realtime gateway. All of them sit behind
//! `auth_middleware` and return `ChatError` on failure.
//!
//! - **`chats`** - list, create (direct or group), mark read
//! - **`messages`** - paginated history

pub mod chats;
pub mod messages;

pub use chats::{create_direct_chat, create_group_chat, list_chats, mark_read};
pub use messages::get_messages;
