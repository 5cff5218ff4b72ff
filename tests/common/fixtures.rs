//! Test fixtures
//!
//! `TestContext` wires the chat core the way `create_app` does, on the
//! in-memory store, and hands out registered users with valid tokens.

use axum::Router;
use chrono::Duration;
use std::sync::Arc;

use failfixes_chat::backend::auth::{JwtKeys, MemoryUserDirectory, UserDirectory, UserIdentity};
use failfixes_chat::backend::chat::{ChatStore, MemoryChatStore};
use failfixes_chat::backend::realtime::{Connection, RealtimeGateway};
use failfixes_chat::backend::routes::create_router;
use failfixes_chat::backend::server::{build_state_with, AppState, ServerConfig};

pub const TEST_SECRET: &str = "integration-test-secret";

#[derive(Debug, Clone)]
pub struct TestUser {
    pub identity: UserIdentity,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> uuid::Uuid {
        self.identity.id
    }
}

pub struct TestContext {
    pub directory: Arc<MemoryUserDirectory>,
    pub state: AppState,
    keys: JwtKeys,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let directory = Arc::new(MemoryUserDirectory::new());
        let store: Arc<dyn ChatStore> = Arc::new(
            MemoryChatStore::new(directory.clone()).with_max_message_len(config.max_message_len),
        );
        Self::with_store(config, directory, store)
    }

    /// Use a custom store, e.g. one that stalls to provoke timeouts
    pub fn with_store(
        config: ServerConfig,
        directory: Arc<MemoryUserDirectory>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let keys = JwtKeys::new(&config.jwt_secret);
        let state = build_state_with(config, directory.clone(), store);
        Self {
            directory,
            state,
            keys,
        }
    }

    pub fn gateway(&self) -> &Arc<RealtimeGateway> {
        &self.state.gateway
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.state.store
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn user(&self, username: &str) -> TestUser {
        let identity = self
            .directory
            .register_user(username, &username.to_uppercase())
            .await
            .expect("register test user");
        let token = self
            .keys
            .create_token(&identity, Duration::hours(1))
            .expect("create test token");
        TestUser { identity, token }
    }

    pub async fn connect(&self, user: &TestUser) -> Connection {
        self.gateway()
            .connect(&user.token)
            .await
            .expect("connect test user")
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::builder()
        .jwt_secret(TEST_SECRET)
        .build()
        .expect("valid test config")
}
