/**
 * Server Initialization
 *
 * # Initialization Process
 *
 * 1. Open the database when `database_url` is set, and run migrations
 * 2. Build the user directory and chat store (PostgreSQL or in-memory)
 * 3. Add the configured `[[users]]` to the directory
 * 4. Build the identity provider and the realtime gateway
 * 5. Assemble `AppState` and the router
 */

use axum::Router;
use std::sync::Arc;

use crate::backend::auth::{
    JwtIdentityProvider, JwtKeys, MemoryUserDirectory, PgUserDirectory, UserDirectory,
};
use crate::backend::chat::{ChatStore, MemoryChatStore, PgChatStore};
use crate::backend::error::ChatResult;
use crate::backend::realtime::RealtimeGateway;
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_database, SeedUser, ServerConfig};
use crate::backend::server::state::AppState;

/// Wire the gateway and its collaborators from `config`
pub async fn build_state(config: ServerConfig) -> ChatResult<AppState> {
    let (directory, store): (Arc<dyn UserDirectory>, Arc<dyn ChatStore>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let pool = load_database(url).await?;
                let directory: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool.clone()));
                let store: Arc<dyn ChatStore> =
                    Arc::new(PgChatStore::new(pool).with_max_message_len(config.max_message_len));
                (directory, store)
            }
            None => {
                tracing::warn!("[Server] DATABASE_URL not set, using the in-memory chat store");
                let directory: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::new());
                let store: Arc<dyn ChatStore> = Arc::new(
                    MemoryChatStore::new(directory.clone())
                        .with_max_message_len(config.max_message_len),
                );
                (directory, store)
            }
        };

    seed_users(directory.as_ref(), &config.users).await?;
    Ok(build_state_with(config, directory, store))
}

/// Add every configured user; ids that already exist are left as stored
pub async fn seed_users(directory: &dyn UserDirectory, users: &[SeedUser]) -> ChatResult<()> {
    for user in users {
        directory.provision_user(&user.identity()).await?;
    }
    if !users.is_empty() {
        tracing::info!("[Server] Seeded {} users", users.len());
    }
    Ok(())
}

/// Same as `build_state`, with the directory and store supplied by the caller
pub fn build_state_with(
    config: ServerConfig,
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn ChatStore>,
) -> AppState {
    let provision = config.provisions_users();
    if provision {
        tracing::info!("[Server] Accepting any validly signed token as a user");
    }
    let identity = Arc::new(
        JwtIdentityProvider::new(JwtKeys::new(&config.jwt_secret), directory)
            .with_provisioning(provision),
    );
    let gateway = Arc::new(
        RealtimeGateway::new(store, identity)
            .with_store_timeout(config.store_timeout())
            .with_queue_capacity(config.outbound_queue_len),
    );
    AppState::new(gateway, config)
}

/// Create and configure the Axum application
///
/// # Returns
///
/// The router and the state it serves, so the caller can shut the gateway
/// down after the server stops.
pub async fn create_app(config: ServerConfig) -> ChatResult<(Router<()>, AppState)> {
    tracing::info!("[Server] Initializing chat core");
    let state = build_state(config).await?;
    let app = create_router(state.clone());
    tracing::info!("[Server] Router configured");
    Ok((app, state))
}
