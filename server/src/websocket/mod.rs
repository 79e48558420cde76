//! Realtime change delivery.
//!
//! Clients connect via WebSocket, issue blueprint requests over the socket and
//! subscribe to resources. Every create, update and destroy is pushed to the
//! resource's other subscribers as an `event`.

mod manager;
mod protocol;

pub use manager::{Connection, Hub, MessageSender};
pub use protocol::*;
