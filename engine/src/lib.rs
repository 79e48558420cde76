//! # Tether Engine
//!
//! Two-way synchronization between an in-memory collection and a server
//! resource.
//!
//! A binding fetches a resource's records into a named collection of a
//! [`Scope`], then keeps both sides in step: server change notifications are
//! applied to the collection, and local additions, removals and edits are
//! sent back as create, destroy and update requests.
//!
//! ## Design Principles
//!
//! - **Transport-agnostic**: the engine talks to the server only through the
//!   [`Transport`] trait
//! - **Identity over position**: watchers follow items by [`ItemKey`], so
//!   inserting or removing neighbours never misattributes an edit
//! - **No echoes**: changes the engine applies from the server are digested
//!   as [`Origin::Remote`]; such digests advance the watchers and are never
//!   turned into requests
//! - **Visible failures**: every outbound request is tracked as an [`Intent`]
//!   in the binding's outbox
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a JSON object. `id` is assigned by the server; records
//! without one are not yet persisted. `updatedAt` is the server's
//! modification timestamp.
//!
//! ### Watchers
//!
//! A [`WatchTable`] dirty-checks the bound collection. Each digest reports
//! shape changes (items added or removed) and per-item content changes
//! against the last digested baseline.
//!
//! ### Remote events
//!
//! Change notifications arrive as [`ChangeMessage`]s with a verb of
//! `created`, `updated` or `destroyed` and are decoded into [`RemoteEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether_engine::{mock::MockTransport, Method, Record, Scope, SyncConfig, Synchronizer};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport = Arc::new(MockTransport::new());
//! transport.on(Method::Get, "/user", Ok(json!([{"id": 1, "name": "Ada"}])));
//!
//! let scope = Scope::new();
//! let sync = Synchronizer::new(transport.clone(), SyncConfig::default());
//! let binding = sync.bind("user", &scope, None).await.unwrap();
//!
//! assert_eq!(binding.collection_name(), "users");
//! assert_eq!(scope.records("users").unwrap(), vec![Record::new().with("id", 1).with("name", "Ada")]);
//! # });
//! ```

pub mod collection;
pub mod config;
pub mod diff;
pub mod error;
pub mod event;
pub mod outbox;
pub mod record;
pub mod resource;
pub mod scope;
pub mod session;
pub mod transport;
pub mod watch;

// Re-export main types at crate root
pub use collection::{BoundCollection, ItemKey};
pub use config::SyncConfig;
pub use diff::{difference, CollectionDiff};
pub use error::{Error, Result};
pub use event::{ChangeMessage, RemoteEvent, Verb};
pub use outbox::{Intent, IntentId, IntentKind, IntentState, Outbox};
pub use record::{Fields, Origin, Record};
pub use resource::Resource;
pub use scope::Scope;
pub use session::{Binding, Synchronizer};
pub use transport::{mock, EventStream, Method, Request, Transport};
pub use watch::{CollectionChange, Digest, ItemChange, WatchTable};
