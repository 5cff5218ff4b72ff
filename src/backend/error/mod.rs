//! Backend Error Module
//!
//! This module defines the error type used across the chat backend.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - ChatError and ChatResult
//! └── conversion.rs - IntoResponse and socket error events
//! ```
//!
//! Every `ChatError` maps to one wire `ErrorCode`, so the same failure looks
//! identical whether it reaches the client as an HTTP body or as a socket
//! `error` event.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::{ChatError, ChatResult};
