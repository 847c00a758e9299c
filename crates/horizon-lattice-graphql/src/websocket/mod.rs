//! Duplex connection over WebSocket.
//!
//! A [`ConnectionSession`] owns one physical handle at a time. It sends the
//! `connection_init` handshake on every new handle, and replaces a closed
//! handle once when auto-reconnect is enabled.
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_graphql::websocket::{ConnectionParams, WebSocketOptions};
//!
//! let options = WebSocketOptions::new("wss://api.example.com/graphql")
//!     .auto_reconnect(true)
//!     .parameters(ConnectionParams::new().insert("authToken", "secret"));
//! ```

mod options;
mod session;

pub use options::{ConnectionParams, HandleState, WebSocketOptions, derive_websocket_url};
pub(crate) use options::validate_websocket_url;
pub use session::ConnectionSession;
