//! Chat Backend Module
//!
//! Persistence of chats and messages, and the REST handlers over it.
//!
//! - **`store`** - the `ChatStore` trait and shared validation
//! - **`state`** - `MemoryChatStore`, used when no database is configured
//! - **`db`** - `PgChatStore`, the PostgreSQL implementation
//! - **`handlers`** - REST endpoints under `/chats`

pub mod db;
pub mod handlers;
pub mod state;
pub mod store;

pub use db::PgChatStore;
pub use state::MemoryChatStore;
pub use store::{AppendOutcome, ChatStore, DEFAULT_MAX_MESSAGE_LEN};
