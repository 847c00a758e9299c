//! GraphQL client for Horizon Lattice.
//!
//! This crate runs GraphQL operations over two channels:
//!
//! - **Request/reply**: queries and mutations are sent as one HTTP POST each
//! - **Duplex**: subscriptions share one WebSocket connection speaking the
//!   `graphql-ws` sub-protocol, multiplexed by operation identifier
//!
//! Every document is classified before any network action: the operation to
//! run is selected by name (required when a document defines several), and
//! its kind decides the channel.
//!
//! # Queries
//!
//! ```ignore
//! use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
//!
//! let client = GraphQLClient::new("https://api.example.com/graphql")
//!     .header("x-api-key", "secret")
//!     .build()?;
//!
//! let response = client
//!     .execute(GraphQLRequest::new("{ users { id name } }"))
//!     .await?;
//! ```
//!
//! # Subscriptions
//!
//! ```ignore
//! use horizon_lattice_graphql::{ConnectionEvents, GraphQLClient, GraphQLRequest, SubscriptionMessage};
//!
//! let client = GraphQLClient::new("https://api.example.com/graphql")
//!     .auto_reconnect(true)
//!     .events(ConnectionEvents::new().on_ready(|| println!("connected")))
//!     .build()?;
//!
//! let mut stream = client
//!     .subscribe(GraphQLRequest::new("subscription { onCreate { id } }"))
//!     .await?;
//!
//! while let Some(message) = stream.next().await {
//!     match message {
//!         SubscriptionMessage::Data(response) => println!("{:?}", response.data),
//!         SubscriptionMessage::Error(errors) => eprintln!("{errors:?}"),
//!         SubscriptionMessage::Complete => break,
//!     }
//! }
//! ```
//!
//! # Logging
//!
//! The crate logs through `tracing` under the `horizon_lattice_graphql::*`
//! targets and never installs a subscriber.

mod error;
pub mod graphql;
pub mod subscription;
pub mod websocket;

pub use error::{ClientError, Result};

// Re-export commonly used types at the crate root
pub use graphql::{
    ClassifiedDocument, Execution, GraphQLClient, GraphQLClientBuilder, GraphQLError,
    GraphQLRequest, GraphQLResponse, OperationKind, QueryFailure, classify,
};
pub use subscription::{
    ConnectionError, ConnectionEvents, OperationHandler, ProtocolState, SubscriptionCallbacks,
    SubscriptionHandle, SubscriptionMessage, SubscriptionStream,
};
pub use websocket::{ConnectionParams, HandleState, WebSocketOptions};
