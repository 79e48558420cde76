//! Tether Server - reference resource server for Tether bindings.
//!
//! Serves blueprint-style REST routes over an in-memory store and pushes a
//! change event to every other subscriber of a resource whenever one of its
//! records is created, updated or destroyed. Requests and subscriptions are
//! available over HTTP, WebSocket, or in-process through [`LocalTransport`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod store;
pub mod transport;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::store::ResourceStore;
use crate::websocket::Hub;

pub use transport::LocalTransport;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResourceStore>,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
}

impl AppState {
    /// Build state for `config`, registering its pre-declared resources.
    pub fn new(config: Config) -> Self {
        let store = ResourceStore::new_shared();
        for resource in &config.resources {
            store.ensure(resource);
        }
        Self {
            store,
            config: Arc::new(config),
            hub: Hub::new_shared(),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
