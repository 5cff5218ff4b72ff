//! Backend Module
//!
//! The server side of the chat core. Compiled with the `ssr` feature.
//!
//! # Architecture
//!
//! - **`server`** - configuration, `AppState`, app construction
//! - **`routes`** - router assembly
//! - **`chat`** - the chat store (memory and PostgreSQL) and REST handlers
//! - **`realtime`** - presence, rooms and the realtime gateway behind `/ws`
//! - **`auth`** - JWT sessions, user directory, identity provider
//! - **`middleware`** - bearer-token authentication for REST
//! - **`error`** - `ChatError` and its HTTP and socket renderings
//!
//! ```text
//! client --ws--> socket --> RealtimeGateway --+--> ChatStore (sole writer)
//!                               |             +--> PresenceTracker
//!                               |             +--> RoomMembershipManager
//! client --http--> /chats handlers --> ChatStore
//! ```

pub mod auth;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;

pub use error::{ChatError, ChatResult};
pub use realtime::RealtimeGateway;
pub use server::create_app;
