//! Connection lifecycle callbacks.
//!
//! All callbacks are optional; only register the ones you need.
//!
//! ```ignore
//! let events = ConnectionEvents::new()
//!     .on_ready(|| println!("handshake acknowledged"))
//!     .on_connection_error(|err| eprintln!("connection error: {err}"));
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Error information passed to the `on_connection_error` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Raw payload of a `connection_error` frame, when the server sent one.
    pub payload: Option<Value>,
}

impl ConnectionError {
    /// Create a connection error without payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    /// Error reported by the server in a `connection_error` frame.
    pub(crate) fn from_server(payload: Option<Value>) -> Self {
        let message = payload
            .as_ref()
            .and_then(|p| p.get("message").and_then(Value::as_str).or_else(|| p.as_str()))
            .unwrap_or("connection error reported by server")
            .to_string();
        Self { message, payload }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Callback without arguments.
pub type OnEventCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving a [`ConnectionError`].
pub type OnConnectionErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Connection lifecycle callbacks.
#[derive(Clone, Default)]
pub struct ConnectionEvents {
    pub(crate) on_ready: Option<OnEventCallback>,
    pub(crate) on_connection_error: Option<OnConnectionErrorCallback>,
    pub(crate) on_keep_alive: Option<OnEventCallback>,
}

impl fmt::Debug for ConnectionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEvents")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_connection_error", &self.on_connection_error.is_some())
            .field("on_keep_alive", &self.on_keep_alive.is_some())
            .finish()
    }
}

impl ConnectionEvents {
    /// Create an empty set of callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once each time the server acknowledges the handshake.
    pub fn on_ready(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_ready = Some(Arc::new(f));
        self
    }

    /// Called for `connection_error` frames, malformed frames and failed
    /// reconnect attempts.
    pub fn on_connection_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_connection_error = Some(Arc::new(f));
        self
    }

    /// Called for every keep-alive frame.
    pub fn on_keep_alive(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_keep_alive = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_ready(&self) {
        if let Some(cb) = &self.on_ready {
            cb();
        }
    }

    pub(crate) fn emit_connection_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_connection_error {
            cb(error);
        }
    }

    pub(crate) fn emit_keep_alive(&self) {
        if let Some(cb) = &self.on_keep_alive {
            cb();
        }
    }
}
