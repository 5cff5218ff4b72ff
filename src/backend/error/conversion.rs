/**
 * Error Conversion
 *
 * `ChatError` implements `IntoResponse` so REST handlers can return it
 * directly, and converts into the socket `error` event for the gateway.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "Error message",
 *   "code": "forbidden",
 *   "status": 403
 * }
 * ```
 */

use axum::{
    response::{IntoResponse, Response},
    Json,
};

use crate::backend::error::types::ChatError;
use crate::shared::ServerEvent;

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("[Server] Request failed: {}", self);
        } else {
            tracing::debug!("[Server] Request rejected: {}", self);
        }

        let body = serde_json::json!({
            "error": self.client_message(),
            "code": self.code(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

impl ChatError {
    /// Structured failure for the connection that issued `command`
    pub fn to_event(&self, command: Option<&str>) -> ServerEvent {
        ServerEvent::error(self.code(), self.client_message(), command)
    }
}
