/**
 * Application State
 *
 * `AppState` is the router's state. The `FromRef` implementations let a
 * handler extract only what it needs, e.g. `State<Arc<dyn ChatStore>>`.
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::auth::IdentityProvider;
use crate::backend::chat::ChatStore;
use crate::backend::realtime::RealtimeGateway;
use crate::backend::server::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    /// Owns live connections, presence and rooms
    pub gateway: Arc<RealtimeGateway>,

    /// Sole writer of persisted chat state; shared with the gateway
    pub store: Arc<dyn ChatStore>,

    pub identity: Arc<dyn IdentityProvider>,

    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(gateway: Arc<RealtimeGateway>, config: ServerConfig) -> Self {
        Self {
            store: gateway.store().clone(),
            identity: gateway.identity().clone(),
            gateway,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<RealtimeGateway> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.gateway.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ChatStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
