//! FailFixes Chat Core
//!
//! Real-time one-to-one and group chat: a chat store that is the sole writer
//! of persisted state, an in-memory presence tracker, a room membership
//! manager, and a realtime gateway that ties them together over WebSockets.
//!
//! # Module Structure
//!
//! - **`shared`** - wire-visible types: chats, messages, socket frames,
//!   error codes, pagination
//! - **`backend`** - the server (feature `ssr`, on by default)
//!
//! # Wire Protocol
//!
//! Every socket frame is `{"event": "<name>", "data": {...}}`. See
//! [`shared::event`] for the full set of commands and events.
//!
//! # Usage
//!
//! ```rust,no_run
//! use failfixes_chat::backend::server::{create_app, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! let (app, state) = create_app(config).await?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! state.gateway.shutdown();
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
