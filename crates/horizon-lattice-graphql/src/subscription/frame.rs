//! Wire frames of the `graphql-ws` sub-protocol.
//!
//! Every frame is a JSON object tagged by its `type` field and sent as one
//! text message over the duplex channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graphql::{GraphQLRequest, GraphQLResponse};

/// Sub-protocol token requested during the WebSocket upgrade.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Payload of a `start` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    /// The operation document.
    pub query: String,
    /// Operation variables; an empty object when the caller gave none.
    #[serde(default)]
    pub variables: Value,
    /// Name of the operation to run.
    #[serde(rename = "operationName", default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Extensions (implementation-specific metadata).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl From<GraphQLRequest> for StartPayload {
    fn from(request: GraphQLRequest) -> Self {
        let variables = request.variables_or_default();
        Self {
            query: request.query,
            variables,
            operation_name: request.operation_name,
            extensions: request.extensions,
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opens the logical connection; carries merged headers and parameters.
    ConnectionInit {
        payload: Value,
    },
    /// Starts an operation.
    Start {
        id: String,
        payload: StartPayload,
    },
    /// Stops an operation.
    Stop {
        id: String,
    },
    /// Ends the logical connection.
    ConnectionTerminate,
}

impl ClientFrame {
    /// Serialize to the text sent on the wire.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake acknowledgment.
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Connection-level error, not tied to an operation.
    ConnectionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keep-alive.
    #[serde(rename = "ka")]
    KeepAlive,
    /// A result for one operation.
    Data {
        id: String,
        payload: GraphQLResponse,
    },
    /// An error for one operation.
    Error {
        id: String,
        #[serde(default)]
        payload: Value,
    },
    /// The operation finished.
    Complete {
        id: String,
    },
}

impl ServerFrame {
    /// Parse one inbound text message.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The operation identifier, for frames that carry one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Data { id, .. } | Self::Error { id, .. } | Self::Complete { id } => Some(id),
            _ => None,
        }
    }
}
