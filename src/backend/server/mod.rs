//! Server Module
//!
//! - **`config`** - `ServerConfig` loading (TOML, environment, `.env`) and the database pool
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`init`** - builds stores, gateway and router from a config

pub mod config;
pub mod init;
pub mod state;

pub use config::{ConfigError, SeedUser, ServerConfig};
pub use init::{build_state, build_state_with, create_app, seed_users};
pub use state::AppState;
