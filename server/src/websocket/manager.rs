//! Connection hub.
//!
//! Tracks active connections and their resource subscriptions, and fans
//! change events out to subscribers.

use std::sync::Arc;

use dashmap::DashMap;
use tether_engine::ChangeMessage;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for connection messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single connection (WebSocket or in-process).
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active connections and subscriptions.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct Hub {
    /// All active connections, keyed by connection ID.
    pub(crate) connections: DashMap<String, Connection>,
    /// Subscribed connection IDs, by resource.
    by_resource: DashMap<String, Vec<String>>,
}

impl Hub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_resource: DashMap::new(),
        }
    }

    /// Create a new hub wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                sender,
            },
        );

        tracing::info!(conn_id = %conn_id, "Connection registered");

        conn_id
    }

    /// Unregister a connection and drop its subscriptions.
    pub fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            for mut subscribers in self.by_resource.iter_mut() {
                subscribers.retain(|id| id != conn_id);
            }
            self.by_resource.retain(|_, subscribers| !subscribers.is_empty());

            tracing::info!(conn_id = %conn_id, "Connection unregistered");
        }
    }

    /// Subscribe a connection to a resource's change events.
    ///
    /// Returns false if the connection is unknown.
    pub fn subscribe(&self, conn_id: &str, resource: &str) -> bool {
        if !self.connections.contains_key(conn_id) {
            return false;
        }

        let mut subscribers = self.by_resource.entry(resource.to_string()).or_default();
        if !subscribers.iter().any(|id| id == conn_id) {
            subscribers.push(conn_id.to_string());
        }

        tracing::debug!(conn_id = %conn_id, resource = %resource, "Subscribed");
        true
    }

    /// Publish a change to every subscriber of `resource` except `origin`.
    ///
    /// Returns the number of connections that received the event.
    pub fn publish(&self, resource: &str, origin: Option<&str>, change: &ChangeMessage) -> usize {
        let subscribers = match self.by_resource.get(resource) {
            Some(subscribers) => subscribers.value().clone(),
            None => return 0,
        };

        let mut sent_count = 0;
        for conn_id in subscribers
            .iter()
            .filter(|id| Some(id.as_str()) != origin)
        {
            if self.send_to(conn_id, ServerMessage::event(resource, change.clone())) {
                sent_count += 1;
            }
        }

        tracing::debug!(
            resource = %resource,
            verb = %change.verb,
            origin = ?origin,
            recipients = sent_count,
            "Published change"
        );

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        if let Some(conn) = self.connections.get(conn_id) {
            conn.sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of connections subscribed to `resource`.
    pub fn subscriber_count(&self, resource: &str) -> usize {
        self.by_resource
            .get(resource)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
