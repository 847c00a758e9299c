//! A scripted `graphql-ws` server for integration tests.
//!
//! Every accepted connection is handed to the test as a [`MockConnection`],
//! which sees the frames the client sent and decides what to answer.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

const WAIT: Duration = Duration::from_secs(5);

enum ServerCommand {
    Text(String),
    Close,
}

/// Install a test subscriber once; repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub struct MockServer {
    port: u16,
    connections: mpsc::UnboundedReceiver<MockConnection>,
    reject: Arc<AtomicBool>,
    hold: watch::Sender<bool>,
}

impl MockServer {
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let port = listener.local_addr().expect("No local address").port();
        let (tx, rx) = mpsc::unbounded_channel();
        let reject = Arc::new(AtomicBool::new(false));

        let (hold, mut held) = watch::channel(false);

        let reject_flag = reject.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if reject_flag.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                if held.wait_for(|held| !*held).await.is_err() {
                    break;
                }

                let protocol = Arc::new(Mutex::new(None));
                let seen = protocol.clone();
                let callback = move |request: &Request, mut response: Response| {
                    if let Some(value) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                        *seen.lock() = value.to_str().ok().map(str::to_string);
                        response
                            .headers_mut()
                            .insert(SEC_WEBSOCKET_PROTOCOL, value.clone());
                    }
                    Ok::<Response, ErrorResponse>(response)
                };

                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let (in_tx, in_rx) = mpsc::unbounded_channel();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel();
                let protocol = protocol.lock().clone();

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            cmd = out_rx.recv() => match cmd {
                                Some(ServerCommand::Text(text)) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCommand::Close) | None => {
                                    let _ = write.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = in_tx.send(text.as_str().to_string());
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });

                let connection = MockConnection {
                    protocol,
                    incoming: in_rx,
                    outgoing: out_tx,
                };
                if tx.send(connection).is_err() {
                    break;
                }
            }
        });

        Self {
            port,
            connections: rx,
            reject,
            hold,
        }
    }

    /// HTTP endpoint; the client derives `ws://` from it.
    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}/graphql", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/graphql", self.port)
    }

    /// Wait for the next upgraded connection.
    pub async fn accept(&mut self) -> MockConnection {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("Timed out waiting for a connection")
            .expect("Server stopped")
    }

    /// Leave new TCP connections waiting before the upgrade.
    pub fn hold_upgrades(&self) {
        self.hold.send_replace(true);
    }

    /// Upgrade held and new connections again.
    pub fn release_upgrades(&self) {
        self.hold.send_replace(false);
    }

    /// Drop new TCP connections before the upgrade.
    pub fn reject_new_connections(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

pub struct MockConnection {
    /// The sub-protocol the client requested.
    pub protocol: Option<String>,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<ServerCommand>,
}

impl MockConnection {
    /// Next frame sent by the client.
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.incoming.recv())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Connection closed");
        serde_json::from_str(&text).expect("Client sent invalid JSON")
    }

    /// Next frame, which must have the given type.
    pub async fn expect(&mut self, frame_type: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["type"], frame_type, "unexpected frame: {frame}");
        frame
    }

    /// A frame sent within `window`, if any.
    pub async fn recv_within(&mut self, window: Duration) -> Option<Value> {
        match tokio::time::timeout(window, self.incoming.recv()).await {
            Ok(Some(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Wait for `connection_init`, acknowledge it and return its payload.
    pub async fn handshake(&mut self) -> Value {
        let init = self.expect("connection_init").await;
        self.send(serde_json::json!({"type": "connection_ack"}));
        init["payload"].clone()
    }

    /// Wait until the client closed the connection.
    pub async fn closed(&mut self) {
        tokio::time::timeout(WAIT, async {
            while self.incoming.recv().await.is_some() {}
        })
        .await
        .expect("Timed out waiting for the client to close");
    }

    pub fn send(&self, frame: Value) {
        let _ = self.outgoing.send(ServerCommand::Text(frame.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.outgoing.send(ServerCommand::Text(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.outgoing.send(ServerCommand::Close);
    }
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not reached in time");
}
