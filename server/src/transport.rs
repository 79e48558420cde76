//! In-process transport.
//!
//! [`LocalTransport`] lets an engine binding talk to an [`AppState`] directly,
//! without a socket. It registers as a hub connection like any WebSocket
//! client, so its own writes are not echoed back to it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tether_engine::{ChangeMessage, EventStream, Request, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handlers::dispatch;
use crate::websocket::ServerMessage;
use crate::AppState;

type Subscribers = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ChangeMessage>>>>>;

/// A hub connection exposed as a [`Transport`].
pub struct LocalTransport {
    state: AppState,
    conn_id: String,
    subscribers: Subscribers,
    pump: JoinHandle<()>,
}

impl LocalTransport {
    /// Connect to `state`. Must be called within a Tokio runtime.
    pub fn connect(state: AppState) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let conn_id = state.hub.register(tx);
        let subscribers: Subscribers = Arc::default();

        let routes = subscribers.clone();
        let pump = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some((resource, change)) = message.into_change() else {
                    continue;
                };
                if let Some(senders) = routes.lock().get_mut(&resource) {
                    senders.retain(|tx| tx.send(change.clone()).is_ok());
                }
            }
        });

        Self {
            state,
            conn_id,
            subscribers,
            pump,
        }
    }

    /// The hub connection ID.
    pub fn connection_id(&self) -> &str {
        &self.conn_id
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(&self, request: Request) -> tether_engine::Result<Value> {
        dispatch(&self.state, Some(&self.conn_id), request).map_err(Into::into)
    }

    async fn subscribe(&self, resource: &str) -> tether_engine::Result<EventStream> {
        if !self.state.hub.subscribe(&self.conn_id, resource) {
            return Err(tether_engine::Error::Transport("connection closed".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(resource.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.state.hub.unregister(&self.conn_id);
        self.pump.abort();
    }
}
