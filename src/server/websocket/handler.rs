//! Push channel route handler.
//!
//! Handles the WebSocket upgrade on the recommendations namespace, the
//! per-connection message loop, and disconnect cleanup. The handshake
//! carries the edge-verified `userId` in the query string; connections
//! without one are rejected before the upgrade.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::connection::SessionRegistry;
use super::messages::{msg_types, system, ClientMessage, ServerMessage};
use crate::error::CoreError;
use crate::push::{PushEngine, RefreshReason};
use crate::server::state::{GuardedPushEngine, GuardedSessionRegistry};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// WebSocket upgrade handler for the push channel.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(registry): State<GuardedSessionRegistry>,
    State(push): State<GuardedPushEngine>,
) -> Response {
    let Some(user_id) = params
        .user_id
        .filter(|id| !id.is_empty() && id.len() <= 255)
    else {
        warn!("push connection attempt without a user id");
        return CoreError::Unauthorized.into_response();
    };

    debug!(user_id = %user_id, "push channel upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, registry, push))
}

async fn handle_socket(
    socket: WebSocket,
    user_id: String,
    registry: Arc<SessionRegistry>,
    push: Arc<PushEngine>,
) {
    let session_id = Uuid::new_v4();
    debug!(user_id = %user_id, %session_id, "push session connected");

    let outgoing_rx = registry.register(&user_id, session_id).await;
    let (ws_sink, ws_stream) = socket.split();

    let connected = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            session_id,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, connected));

    process_incoming(ws_stream, &user_id, session_id, &registry, &push).await;

    debug!(user_id = %user_id, %session_id, "push session disconnected");
    outgoing_handle.abort();
    registry.unregister(&user_id, session_id).await;
}

/// Forward messages from the registry channel to the socket.
async fn forward_outgoing(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<ServerMessage>,
    connected: ServerMessage,
) {
    if send_message(&mut ws_sink, &connected).await.is_err() {
        return;
    }
    while let Some(message) = outgoing_rx.recv().await {
        if send_message(&mut ws_sink, &message).await.is_err() {
            break;
        }
    }
}

async fn send_message(
    ws_sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    ws_sink.send(Message::Text(text.into())).await
}

async fn process_incoming(
    mut ws_stream: SplitStream<WebSocket>,
    user_id: &str,
    session_id: Uuid,
    registry: &SessionRegistry,
    push: &Arc<PushEngine>,
) {
    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => {
                let client_message: ClientMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(user_id, error = %err, "unparseable client message");
                        let error = ServerMessage::new(
                            msg_types::ERROR,
                            system::Error::new("invalid_message", "could not parse message"),
                        );
                        let _ = registry.send_to_session(user_id, session_id, error).await;
                        continue;
                    }
                };
                handle_client_message(client_message, user_id, session_id, registry, push).await;
            }
            Message::Close(_) => break,
            // Protocol-level ping/pong frames are answered by axum.
            _ => {}
        }
    }
}

async fn handle_client_message(
    message: ClientMessage,
    user_id: &str,
    session_id: Uuid,
    registry: &SessionRegistry,
    push: &Arc<PushEngine>,
) {
    match message.msg_type.as_str() {
        msg_types::PING => {
            let _ = registry
                .send_to_session(user_id, session_id, ServerMessage::empty(msg_types::PONG))
                .await;
        }
        msg_types::REQUEST_REFRESH => {
            // Detached so a slow refresh never stalls this session's loop.
            let push = push.clone();
            let user = user_id.to_string();
            tokio::spawn(async move {
                push.trigger_refresh(&user, RefreshReason::ManualRefresh).await;
            });
        }
        other => {
            debug!(user_id, msg_type = other, "unknown client message type");
            let error = ServerMessage::new(
                msg_types::ERROR,
                system::Error::new("unknown_type", format!("unknown message type: {other}")),
            );
            let _ = registry.send_to_session(user_id, session_id, error).await;
        }
    }
}
