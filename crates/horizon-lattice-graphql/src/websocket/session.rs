//! Connection session: owns the physical duplex handle.
//!
//! One spawned task drives the handle. It multiplexes outbound commands and
//! inbound messages with `tokio::select!`, hands every text message to the
//! [`Dispatcher`](crate::subscription::Dispatcher), and replaces the handle
//! when it closes and reconnection applies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::options::{HandleState, WebSocketOptions};
use crate::error::{ClientError, Result};
use crate::subscription::{
    ClientFrame, ConnectionError, ConnectionEvents, Dispatcher, OperationEntry, OperationHandler,
    OperationRegistry, ProtocolState, StartPayload,
};

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent to the connection task.
enum Command {
    Text(String),
    Close,
    Reconnect,
}

/// Why the task stopped pumping one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    ClosedByClient,
    ReconnectRequested,
    Lost,
}

/// One duplex connection and the operations multiplexed over it.
pub struct ConnectionSession {
    options: WebSocketOptions,
    headers: RwLock<HashMap<String, String>>,
    registry: Arc<Mutex<OperationRegistry>>,
    dispatcher: Dispatcher,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    handle_state: Mutex<HandleState>,
    is_running: AtomicBool,
    closing: AtomicBool,
    generation: AtomicU64,
}

impl ConnectionSession {
    pub(crate) fn new(
        options: WebSocketOptions,
        headers: HashMap<String, String>,
        events: ConnectionEvents,
    ) -> Arc<Self> {
        let registry = Arc::new(Mutex::new(OperationRegistry::new()));
        Arc::new(Self {
            options,
            headers: RwLock::new(headers),
            dispatcher: Dispatcher::new(registry.clone(), events),
            registry,
            command_tx: Mutex::new(None),
            handle_state: Mutex::new(HandleState::Disconnected),
            is_running: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    /// The WebSocket URL of this session.
    pub fn url(&self) -> &str {
        &self.options.url
    }

    /// Logical connection state.
    pub fn state(&self) -> ProtocolState {
        self.dispatcher.state()
    }

    /// Physical handle state.
    pub fn handle_state(&self) -> HandleState {
        *self.handle_state.lock()
    }

    /// Whether a physical handle is open.
    pub fn is_open(&self) -> bool {
        self.command_tx.lock().is_some()
    }

    /// Identifiers of the registered operations, in allocation order.
    pub fn active_operations(&self) -> Vec<String> {
        self.registry.lock().ids()
    }

    pub(crate) fn registry(&self) -> &Arc<Mutex<OperationRegistry>> {
        &self.registry
    }

    /// Open the physical handle and queue the `connection_init` frame.
    ///
    /// Returns once the handle is open; the acknowledgment is awaited
    /// separately with [`wait_ready`](Self::wait_ready). Opening a session
    /// that is already running is a no-op.
    pub(crate) async fn open(self: &Arc<Self>) -> Result<()> {
        if self.dispatcher.state() == ProtocolState::Terminated {
            return Err(ClientError::Terminated);
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        *self.handle_state.lock() = HandleState::Connecting;
        match self.connect().await {
            Ok(stream) => {
                let commands = self.attach();
                tokio::spawn(self.clone().drive(stream, commands));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    target: "horizon_lattice_graphql::session",
                    url = %self.options.url,
                    error = %e,
                    "failed to open connection"
                );
                *self.handle_state.lock() = HandleState::Closed;
                self.is_running.store(false, Ordering::SeqCst);
                self.dispatcher.terminate();
                Err(e)
            }
        }
    }

    /// Wait until the handshake is acknowledged.
    pub(crate) async fn wait_ready(&self) -> Result<()> {
        let mut state = self.dispatcher.watch_state();
        let ready = state.wait_for(|s| *s != ProtocolState::Uninitialized);
        match tokio::time::timeout(self.options.connection_timeout, ready).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Err(_)) => Err(ClientError::Terminated),
            Ok(Ok(state)) => match *state {
                ProtocolState::Ready => Ok(()),
                _ => Err(ClientError::Terminated),
            },
        }
    }

    /// Send a frame on the live handle.
    ///
    /// Returns whether a live handle accepted the frame; frames are dropped
    /// when no handle is open.
    pub(crate) fn send(&self, frame: &ClientFrame) -> bool {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(target: "horizon_lattice_graphql::session", error = %e, "failed to encode frame");
                return false;
            }
        };
        let accepted = self
            .command_tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Text(text)).is_ok());
        if !accepted {
            tracing::trace!(target: "horizon_lattice_graphql::session", "no live handle; frame dropped");
        }
        accepted
    }

    /// Register an operation and send its `start` frame on the live handle.
    ///
    /// Both happen under the handle lock, so the entry records the handle
    /// that saw its `start` frame. Returns the new identifier and the number
    /// of registered operations.
    pub(crate) fn start_operation(
        &self,
        payload: StartPayload,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<(String, usize)> {
        let command_tx = self.command_tx.lock();
        let Some(tx) = command_tx.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        let generation = self.generation.load(Ordering::SeqCst);

        let mut registry = self.registry.lock();
        let id = registry.allocate_id();
        let text = ClientFrame::Start {
            id: id.clone(),
            payload: payload.clone(),
        }
        .to_text()?;
        registry.register(id.clone(), OperationEntry::new(payload, handler).started_on(generation))?;

        if tx.send(Command::Text(text)).is_err() {
            registry.remove(&id);
            return Err(ClientError::NotConnected);
        }
        Ok((id, registry.len()))
    }

    /// Replace the headers sent with `connection_init`.
    ///
    /// A live handle is replaced so the server sees the new headers.
    pub(crate) fn update_headers(&self, headers: HashMap<String, String>) {
        *self.headers.write() = headers;
        if let Some(tx) = self.command_tx.lock().as_ref() {
            let _ = tx.send(Command::Reconnect);
        }
    }

    /// Send `connection_terminate` and close the handle.
    ///
    /// The task then terminates the logical connection.
    pub(crate) fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(tx) = self.command_tx.lock().as_ref() {
            if let Ok(text) = ClientFrame::ConnectionTerminate.to_text() {
                let _ = tx.send(Command::Text(text));
            }
            let _ = tx.send(Command::Close);
            return;
        }
        if !self.is_running.load(Ordering::SeqCst) {
            *self.handle_state.lock() = HandleState::Closed;
            self.dispatcher.terminate();
        }
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self
            .options
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let protocol = HeaderValue::from_str(&self.options.sub_protocol)
            .map_err(|e| ClientError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        let (stream, _response) = tokio::time::timeout(
            self.options.connection_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| ClientError::Timeout)?
        .map_err(|e| ClientError::Connection(e.to_string()))?;

        tracing::debug!(
            target: "horizon_lattice_graphql::session",
            url = %self.options.url,
            protocol = %self.options.sub_protocol,
            "handle opened"
        );
        Ok(stream)
    }

    /// Install the command channel of a new handle and queue its handshake.
    fn attach(&self) -> mpsc::UnboundedReceiver<Command> {
        let (tx, rx) = mpsc::unbounded_channel();

        let init = ClientFrame::ConnectionInit {
            payload: self.options.parameters.init_payload(&self.headers.read()),
        };
        match init.to_text() {
            Ok(text) => {
                let _ = tx.send(Command::Text(text));
            }
            Err(e) => {
                tracing::warn!(target: "horizon_lattice_graphql::session", error = %e, "failed to encode connection_init");
            }
        }

        self.dispatcher.reset();
        {
            let mut command_tx = self.command_tx.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *command_tx = Some(tx);
        }
        *self.handle_state.lock() = HandleState::Connected;
        rx
    }

    async fn drive(self: Arc<Self>, stream: WsStream, commands: mpsc::UnboundedReceiver<Command>) {
        let mut stream = stream;
        let mut commands = commands;

        loop {
            let exit = self.pump(stream, &mut commands).await;
            // Readiness ends with the handle; callers wait for the next ack.
            self.dispatcher.reset();
            commands.close();
            *self.command_tx.lock() = None;
            tracing::debug!(target: "horizon_lattice_graphql::session", ?exit, "handle closed");

            let reconnect = match exit {
                PumpExit::ClosedByClient => false,
                PumpExit::ReconnectRequested => true,
                PumpExit::Lost => self.options.auto_reconnect,
            };
            if !reconnect || self.closing.load(Ordering::SeqCst) {
                break;
            }

            *self.handle_state.lock() = HandleState::Reconnecting;
            tracing::info!(target: "horizon_lattice_graphql::session", url = %self.options.url, "reconnecting");

            match self.connect().await {
                Ok(mut next) => {
                    if self.closing.load(Ordering::SeqCst) {
                        let _ = next.close(None).await;
                        break;
                    }
                    commands = self.attach();
                    stream = next;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "horizon_lattice_graphql::session",
                        error = %e,
                        "reconnect failed"
                    );
                    self.dispatcher
                        .events()
                        .emit_connection_error(ConnectionError::new(format!("reconnect failed: {e}")));
                    break;
                }
            }
        }

        *self.handle_state.lock() = HandleState::Closed;
        self.is_running.store(false, Ordering::SeqCst);
        self.dispatcher.terminate();
        tracing::debug!(target: "horizon_lattice_graphql::session", "connection terminated");
    }

    async fn pump(&self, stream: WsStream, commands: &mut mpsc::UnboundedReceiver<Command>) -> PumpExit {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Text(text)) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                tracing::warn!(target: "horizon_lattice_graphql::session", error = %e, "send failed");
                                return PumpExit::Lost;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return PumpExit::ClosedByClient;
                        }
                        Some(Command::Reconnect) => {
                            let _ = write.send(Message::Close(None)).await;
                            return PumpExit::ReconnectRequested;
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if self.dispatcher.dispatch(text.as_str()) == Some(ProtocolState::Ready) {
                                self.replay();
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(target: "horizon_lattice_graphql::session", ?frame, "server closed the handle");
                            return PumpExit::Lost;
                        }
                        Some(Ok(_)) => {
                            // Ping/pong is answered by tungstenite; binary is not part of the protocol.
                        }
                        Some(Err(e)) => {
                            tracing::warn!(target: "horizon_lattice_graphql::session", error = %e, "read failed");
                            return PumpExit::Lost;
                        }
                        None => return PumpExit::Lost,
                    }
                }
            }
        }
    }

    /// Re-send the `start` frame of every operation started on an earlier
    /// handle after a reconnect was acknowledged.
    ///
    /// Operations already started on the current handle are skipped.
    fn replay(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        if !self.options.resubscribe_on_reconnect || generation < 2 {
            return;
        }
        let entries = self.registry.lock().restart(generation);
        if entries.is_empty() {
            return;
        }
        tracing::debug!(
            target: "horizon_lattice_graphql::session",
            count = entries.len(),
            "replaying operations"
        );
        for (id, payload) in entries {
            self.send(&ClientFrame::Start { id, payload });
        }
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("url", &self.options.url)
            .field("state", &self.state())
            .field("handle_state", &self.handle_state())
            .finish()
    }
}
