//! Middleware Module
//!
//! - **`auth`** - bearer-token authentication for the REST routes

pub mod auth;

pub use auth::{auth_middleware, bearer_token, AuthUser};
