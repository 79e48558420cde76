//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded and use snake_case for field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_engine::{ChangeMessage, Method};

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A blueprint request, answered with a `response`.
    Request {
        /// Request ID for correlating responses
        #[serde(default)]
        request_id: Option<String>,
        method: Method,
        path: String,
        /// Query parameters or body
        #[serde(default)]
        params: Value,
    },

    /// Receive change events for a resource.
    Subscribe {
        resource: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to a request: an HTTP-style status and the body.
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        status: u16,
        body: Value,
    },

    /// Subscription confirmed.
    Subscribed {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// A record of a subscribed resource changed.
    /// Sent to every subscriber except the connection that made the change.
    Event {
        resource: String,
        verb: String,
        id: Value,
        data: Value,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        /// Error description
        message: String,
        /// Request ID from the original request (if applicable)
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }

    /// Create a change event for `resource`.
    pub fn event(resource: impl Into<String>, change: ChangeMessage) -> Self {
        ServerMessage::Event {
            resource: resource.into(),
            verb: change.verb,
            id: change.id,
            data: change.data,
        }
    }

    /// Split an event back into its resource and change message.
    pub fn into_change(self) -> Option<(String, ChangeMessage)> {
        match self {
            ServerMessage::Event {
                resource,
                verb,
                id,
                data,
            } => Some((resource, ChangeMessage { verb, id, data })),
            _ => None,
        }
    }
}
