//! Request handlers shared by the HTTP routes, WebSocket connections and the
//! in-process transport.

pub mod blueprint;
pub mod websocket;

pub use blueprint::{dispatch, resolve, Action};
pub use websocket::{handle_websocket_connection, process_message};
