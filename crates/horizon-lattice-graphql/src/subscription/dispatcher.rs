//! Protocol dispatcher: routes inbound frames and tracks the logical
//! connection state.
//!
//! Frames are handled one at a time, in arrival order. Operation handlers
//! are invoked after the registry lock is released, so a handler may cancel
//! its own operation (or any other) from inside a callback.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::events::{ConnectionError, ConnectionEvents};
use super::frame::ServerFrame;
use super::registry::OperationRegistry;
use crate::graphql::GraphQLError;

/// Logical state of the duplex connection, independent of the physical
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// Waiting for the handshake acknowledgment.
    #[default]
    Uninitialized,
    /// Handshake acknowledged; operations may start.
    Ready,
    /// Torn down; no further frames are meaningful.
    Terminated,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Message delivered to operations that were still active when the
/// connection terminated.
pub(crate) const CONNECTION_CLOSED: &str = "connection closed";

pub(crate) struct Dispatcher {
    registry: Arc<Mutex<OperationRegistry>>,
    state: watch::Sender<ProtocolState>,
    events: ConnectionEvents,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<Mutex<OperationRegistry>>, events: ConnectionEvents) -> Self {
        let (state, _) = watch::channel(ProtocolState::Uninitialized);
        Self {
            registry,
            state,
            events,
        }
    }

    pub(crate) fn state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ProtocolState> {
        self.state.subscribe()
    }

    pub(crate) fn events(&self) -> &ConnectionEvents {
        &self.events
    }

    /// Interpret one inbound text message.
    ///
    /// Returns the new state when the frame caused a transition.
    pub(crate) fn dispatch(&self, text: &str) -> Option<ProtocolState> {
        match ServerFrame::parse(text) {
            Ok(frame) => self.handle(frame),
            Err(e) => {
                tracing::warn!(
                    target: "horizon_lattice_graphql::dispatcher",
                    error = %e,
                    "discarding malformed frame"
                );
                self.events
                    .emit_connection_error(ConnectionError::new(format!("malformed frame: {e}")));
                None
            }
        }
    }

    pub(crate) fn handle(&self, frame: ServerFrame) -> Option<ProtocolState> {
        match frame {
            ServerFrame::ConnectionAck { .. } => {
                let changed = self.state.send_if_modified(|state| {
                    if *state == ProtocolState::Uninitialized {
                        *state = ProtocolState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    tracing::debug!(target: "horizon_lattice_graphql::dispatcher", "connection acknowledged");
                    self.events.emit_ready();
                    return Some(ProtocolState::Ready);
                }
                None
            }
            ServerFrame::KeepAlive => {
                self.events.emit_keep_alive();
                None
            }
            ServerFrame::Data { id, payload } => {
                if let Some(handler) = self.handler_for(&id) {
                    handler.on_data(payload);
                }
                None
            }
            ServerFrame::Error { id, payload } => {
                if let Some(handler) = self.handler_for(&id) {
                    handler.on_error(GraphQLError::from_payload(payload));
                }
                None
            }
            ServerFrame::Complete { id } => {
                let entry = self.registry.lock().remove(&id);
                match entry {
                    Some(entry) => entry.handler.on_complete(),
                    None => Self::discarded(&id),
                }
                None
            }
            ServerFrame::ConnectionError { payload } => {
                let error = ConnectionError::from_server(payload);
                tracing::warn!(
                    target: "horizon_lattice_graphql::dispatcher",
                    message = %error.message,
                    "server reported a connection error"
                );
                self.events.emit_connection_error(error);
                None
            }
        }
    }

    /// A new physical handle is attached; wait for a fresh acknowledgment.
    pub(crate) fn reset(&self) {
        self.state.send_if_modified(|state| {
            if *state == ProtocolState::Ready {
                *state = ProtocolState::Uninitialized;
                true
            } else {
                false
            }
        });
    }

    /// Enter `Terminated` and release every remaining operation.
    pub(crate) fn terminate(&self) {
        self.state.send_replace(ProtocolState::Terminated);

        let remaining = {
            let mut registry = self.registry.lock();
            if registry.is_empty() {
                return;
            }
            registry.drain()
        };
        tracing::debug!(
            target: "horizon_lattice_graphql::dispatcher",
            count = remaining.len(),
            "releasing operations of terminated connection"
        );
        for (_, entry) in remaining {
            entry.handler.on_error(vec![GraphQLError::new(CONNECTION_CLOSED)]);
        }
    }

    fn handler_for(&self, id: &str) -> Option<Arc<dyn super::handle::OperationHandler>> {
        let handler = self.registry.lock().lookup(id).map(|entry| entry.handler.clone());
        if handler.is_none() {
            Self::discarded(id);
        }
        handler
    }

    fn discarded(id: &str) {
        tracing::trace!(
            target: "horizon_lattice_graphql::dispatcher",
            id,
            "discarding frame for unknown operation"
        );
    }
}
