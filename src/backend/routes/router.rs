/**
 * Router Configuration
 *
 * Combines the REST chat routes, the socket endpoint and the health check
 * into one router, with request tracing and CORS applied to all of them.
 */

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::error::ChatError;
use crate::backend::realtime::{handle_socket_upgrade, RealtimeGateway};
use crate::backend::routes::chat_routes::configure_chat_routes;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
///
/// # Route Details
///
/// - `GET /health` - liveness check with the live connection count
/// - `GET /ws` - realtime socket (token in header or `?token=`)
/// - `/chats/...` - see `chat_routes`
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ws", get(handle_socket_upgrade));

    let router = configure_chat_routes(router, &app_state);

    router
        .fallback(|| async { ChatError::not_found("route") })
        .layer(cors_layer(&app_state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health(State(gateway): State<Arc<RealtimeGateway>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": gateway.connection_count(),
    }))
}

/// Only the configured origins may make cross-origin calls
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("[Server] Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
