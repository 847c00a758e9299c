//! Error types for the GraphQL client.

use crate::graphql::{OperationKind, QueryFailure};

/// Errors produced by the GraphQL client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The duplex connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// The query document is not valid GraphQL syntax.
    #[error("GraphQL syntax error: {0}")]
    Parse(String),

    /// The document defines several operations and none was selected.
    #[error(
        "document contains {count} operations; choose one with an operation name"
    )]
    AmbiguousOperation {
        /// Number of operation definitions in the document.
        count: usize,
    },

    /// No operation in the document carries the requested name.
    #[error("query with name '{name}' not found in input")]
    OperationNotFound {
        /// The requested operation name.
        name: String,
    },

    /// The document contains fragments only.
    #[error("document does not contain an operation definition")]
    NoOperation,

    /// The operation kind does not match the transport it was sent to.
    #[error("expected a {expected} operation, found a {found}")]
    UnexpectedOperation {
        /// The kind the call requires.
        expected: OperationKind,
        /// The kind the document declares.
        found: OperationKind,
    },

    /// An operation identifier was registered twice on one connection.
    #[error("operation identifier '{0}' is already registered")]
    DuplicateIdentifier(String),

    /// No live duplex connection exists.
    #[error("duplex connection has not been established")]
    NotConnected,

    /// The logical connection was terminated.
    #[error("duplex connection was terminated")]
    Terminated,

    /// Connecting or waiting for the handshake acknowledgment timed out.
    #[error("timed out waiting for the duplex connection")]
    Timeout,

    /// A request/reply call failed; carries the normalized GraphQL error shape.
    #[error("{0}")]
    Query(QueryFailure),
}

impl ClientError {
    /// Returns the normalized request/reply failure, if this is one.
    pub fn as_query_failure(&self) -> Option<&QueryFailure> {
        match self {
            Self::Query(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for ClientError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for ClientError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<graphql_parser::query::ParseError> for ClientError {
    fn from(err: graphql_parser::query::ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<QueryFailure> for ClientError {
    fn from(failure: QueryFailure) -> Self {
        Self::Query(failure)
    }
}

/// A specialized Result type for GraphQL client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
