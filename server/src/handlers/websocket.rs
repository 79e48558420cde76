//! WebSocket handler for realtime sync.
//!
//! Handles WebSocket connections, serves blueprint requests made over the
//! socket and forwards change events for the resources the client
//! subscribed to.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tether_engine::{Request, Resource};
use tokio::sync::mpsc;

use crate::websocket::{ClientMessage, ServerMessage};
use crate::AppState;

use super::dispatch;

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection with the hub
/// 2. Spawns a task to forward outgoing messages
/// 3. Processes incoming messages in a loop
/// 4. Cleans up on disconnect
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_id = state.hub.register(tx);

    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    // Process incoming messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &state, &conn_id);
                state.hub.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(data)) => {
                tracing::trace!("Received ping: {} bytes", data.len());
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!("Received pong");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Clean up
    state.hub.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        active_connections = state.hub.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Process a client message and return the reply for that connection.
pub fn process_message(text: &str, state: &AppState, conn_id: &str) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    match client_msg {
        ClientMessage::Request {
            request_id,
            method,
            path,
            params,
        } => match dispatch(state, Some(conn_id), Request::new(method, path, params)) {
            Ok(body) => ServerMessage::Response {
                request_id,
                status: 200,
                body,
            },
            Err(e) => ServerMessage::Response {
                request_id,
                status: e.status().as_u16(),
                body: e.body(),
            },
        },

        ClientMessage::Subscribe {
            resource,
            request_id,
        } => {
            if let Err(e) = Resource::new(resource.as_str()) {
                return ServerMessage::error(e.to_string(), request_id);
            }
            state.hub.subscribe(conn_id, &resource);
            ServerMessage::Subscribed {
                resource,
                request_id,
            }
        }

        ClientMessage::Ping => ServerMessage::Pong,
    }
}
