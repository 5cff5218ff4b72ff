/**
 * WebSocket Transport
 *
 * `GET /ws` upgrades to a WebSocket after the bearer token has been
 * verified. A request without a valid token is refused with 401 and leaves
 * no trace in the gateway.
 *
 * Per connection:
 * - a writer task drains the gateway's outbound queue as JSON text frames
 * - the reader decodes `ClientCommand` frames and hands them to the gateway
 * - whichever side ends first, the connection is finalized exactly once via
 *   `RealtimeGateway::disconnect`
 */

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use super::connection::ConnectionId;
use super::gateway::RealtimeGateway;
use crate::backend::auth::UserIdentity;
use crate::backend::error::{ChatError, ChatResult};
use crate::backend::middleware::bearer_token;
use crate::shared::ClientCommand;

#[derive(Debug, Default, Deserialize)]
pub struct SocketQuery {
    /// Browsers cannot set headers on an upgrade request
    pub token: Option<String>,
}

/// Handle the socket handshake (GET /ws)
///
/// # Errors
///
/// * `401 Unauthorized` - missing, invalid or expired token
/// * `400 Bad Request` - authenticated, but not a WebSocket upgrade
pub async fn handle_socket_upgrade(
    State(gateway): State<Arc<RealtimeGateway>>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ChatResult<Response> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| ChatError::unauthorized("missing bearer token"))?;

    let user = gateway.authenticate(&token).await?;

    let upgrade = upgrade.map_err(|rejection| {
        tracing::debug!("[Gateway] Not an upgrade request: {}", rejection);
        ChatError::bad_request("expected a websocket upgrade")
    })?;

    Ok(upgrade.on_upgrade(move |socket| run_connection(gateway, user, socket)))
}

/// Decode one text frame into a command
pub fn decode_command(frame: &str) -> ChatResult<ClientCommand> {
    serde_json::from_str(frame)
        .map_err(|e| ChatError::bad_request(format!("malformed command frame: {}", e)))
}

async fn run_connection(gateway: Arc<RealtimeGateway>, user: UserIdentity, socket: WebSocket) {
    let connection = match gateway.attach(user).await {
        Ok(connection) => connection,
        Err(err) => {
            tracing::warn!("[Gateway] Could not activate connection: {}", err);
            return;
        }
    };
    let connection_id = connection.id;
    let mut events = connection.events;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("[Gateway] Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    dispatch(&gateway, connection_id, text.as_str()).await;
                }
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => dispatch(&gateway, connection_id, text).await,
                    Err(_) => reject_frame(&gateway, connection_id, "binary frame is not UTF-8"),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("[Gateway] {} read error: {}", connection_id, e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    gateway.disconnect(connection_id).await;
    writer.abort();
}

async fn dispatch(gateway: &RealtimeGateway, connection_id: ConnectionId, frame: &str) {
    match decode_command(frame) {
        Ok(command) => gateway.process(connection_id, command).await,
        Err(err) => {
            tracing::debug!("[Gateway] {} sent a bad frame: {}", connection_id, err);
            gateway.send_to(connection_id, err.to_event(None));
        }
    }
}

fn reject_frame(gateway: &RealtimeGateway, connection_id: ConnectionId, reason: &str) {
    gateway.send_to(connection_id, ChatError::bad_request(reason).to_event(None));
}
