//! Route Configuration Module
//!
//! - **`router`** - top-level router: health, socket, tracing, CORS
//! - **`chat_routes`** - authenticated REST routes under `/chats`

pub mod chat_routes;
pub mod router;

pub use router::create_router;
