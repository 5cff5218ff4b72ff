//! Authentication Module
//!
//! Identity is external to the chat core: a token comes in, a user ID comes
//! out. This module provides that boundary.
//!
//! - **`sessions`** - JWT claims, token creation and verification
//! - **`users`** - `UserDirectory` lookups (memory and PostgreSQL)
//! - **`identity`** - `IdentityProvider`, used by the gateway and the REST middleware

pub mod identity;
pub mod sessions;
pub mod users;

pub use identity::{IdentityProvider, JwtIdentityProvider};
pub use sessions::{Claims, JwtKeys};
pub use users::{MemoryUserDirectory, PgUserDirectory, UserDirectory, UserIdentity};
