//! Transport abstraction.
//!
//! The engine never talks to the network itself. A [`Transport`] provides a
//! request/response call and a per-resource channel of change notifications;
//! implementations may sit on WebSockets, HTTP plus a push channel, or an
//! in-process server for tests.

use crate::error::Result;
use crate::event::ChangeMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A single request to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub path: String,
    /// Query parameters or body, passed through verbatim
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, params: Value) -> Self {
        Self {
            method,
            path: path.into(),
            params,
        }
    }

    pub fn get(path: impl Into<String>, params: Value) -> Self {
        Self::new(Method::Get, path, params)
    }

    pub fn post(path: impl Into<String>, params: Value) -> Self {
        Self::new(Method::Post, path, params)
    }

    pub fn put(path: impl Into<String>, params: Value) -> Self {
        Self::new(Method::Put, path, params)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, Value::Null)
    }
}

/// Stream of change notifications for one resource, in arrival order.
pub type EventStream = mpsc::UnboundedReceiver<ChangeMessage>;

/// Connection to the server holding the bound resources.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a request and return the response body.
    async fn request(&self, request: Request) -> Result<Value>;

    /// Subscribe to change notifications for `resource`.
    async fn subscribe(&self, resource: &str) -> Result<EventStream>;
}

pub mod mock {
    //! A scripted, recording transport for tests.

    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    type Responder = Box<dyn Fn(&Request) -> Option<Result<Value>> + Send + Sync>;

    /// Transport answering from registered responders and recording every
    /// request it sees.
    ///
    /// Responders are consulted newest first; a request nobody answers fails
    /// with [`Error::NotFound`].
    #[derive(Default)]
    pub struct MockTransport {
        responders: Mutex<Vec<Responder>>,
        requests: Mutex<Vec<Request>>,
        channels: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ChangeMessage>>>>,
        fail_subscribe: Mutex<bool>,
    }

    impl MockTransport {
        /// Creates a new mock transport.
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer requests with this method and exact path.
        pub fn on(&self, method: Method, path: impl Into<String>, response: Result<Value>) {
            let path = path.into();
            self.when(
                move |req| req.method == method && req.path == path,
                response,
            );
        }

        /// Answer requests matching `predicate`.
        pub fn when(
            &self,
            predicate: impl Fn(&Request) -> bool + Send + Sync + 'static,
            response: Result<Value>,
        ) {
            self.respond_with(move |req| predicate(req).then(|| response.clone()));
        }

        /// Answer requests with a custom responder.
        pub fn respond_with(
            &self,
            responder: impl Fn(&Request) -> Option<Result<Value>> + Send + Sync + 'static,
        ) {
            self.responders.lock().push(Box::new(responder));
        }

        /// Make every subsequent `subscribe` fail.
        pub fn fail_subscriptions(&self) {
            *self.fail_subscribe.lock() = true;
        }

        /// Push a change notification to every subscriber of `resource`.
        ///
        /// Returns the number of subscribers reached.
        pub fn emit(&self, resource: &str, message: ChangeMessage) -> usize {
            let mut channels = self.channels.lock();
            let Some(senders) = channels.get_mut(resource) else {
                return 0;
            };
            senders.retain(|tx| !tx.is_closed());
            senders
                .iter()
                .filter(|tx| tx.send(message.clone()).is_ok())
                .count()
        }

        /// Number of live subscriptions to `resource`.
        pub fn subscriber_count(&self, resource: &str) -> usize {
            self.channels
                .lock()
                .get(resource)
                .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
                .unwrap_or(0)
        }

        /// Every request seen so far, in order.
        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().clone()
        }

        /// Requests with the given method.
        pub fn requests_with(&self, method: Method) -> Vec<Request> {
            self.requests
                .lock()
                .iter()
                .filter(|req| req.method == method)
                .cloned()
                .collect()
        }

        /// Forget recorded requests.
        pub fn clear_requests(&self) {
            self.requests.lock().clear();
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn request(&self, request: Request) -> Result<Value> {
            self.requests.lock().push(request.clone());
            let responders = self.responders.lock();
            responders
                .iter()
                .rev()
                .find_map(|responder| responder(&request))
                .unwrap_or_else(|| Err(Error::NotFound(request.path.clone())))
        }

        async fn subscribe(&self, resource: &str) -> Result<EventStream> {
            if *self.fail_subscribe.lock() {
                return Err(Error::Transport("subscription refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.channels
                .lock()
                .entry(resource.to_string())
                .or_default()
                .push(tx);
            Ok(rx)
        }
    }
}
