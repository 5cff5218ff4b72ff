/**
 * Chat Routes
 *
 * # Routes
 *
 * - `GET /chats` - chats of the authenticated user
 * - `POST /chats/direct` - get or create a direct chat
 * - `POST /chats/group` - create a group chat
 * - `GET /chats/{chat_id}/messages` - paginated history
 * - `POST /chats/{chat_id}/read` - reset the caller's unread counter
 *
 * Every route here requires `Authorization: Bearer <token>`.
 */

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::backend::chat::handlers::{
    create_direct_chat, create_group_chat, get_messages, list_chats, mark_read,
};
use crate::backend::middleware::auth_middleware;
use crate::backend::server::state::AppState;

/// Add the authenticated chat routes to `router`
///
/// # Arguments
///
/// * `router` - The router to add routes to
/// * `state` - Used by the auth middleware to reach the identity provider
pub fn configure_chat_routes(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let chats = Router::new()
        .route("/chats", get(list_chats))
        .route("/chats/direct", post(create_direct_chat))
        .route("/chats/group", post(create_group_chat))
        .route("/chats/{chat_id}/messages", get(get_messages))
        .route("/chats/{chat_id}/read", post(mark_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    router.merge(chats)
}
