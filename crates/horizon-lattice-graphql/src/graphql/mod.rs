//! GraphQL client for queries, mutations, and subscriptions.
//!
//! This module provides a GraphQL client that supports:
//! - Query and mutation execution over HTTP
//! - Variables via JSON
//! - Subscriptions over WebSocket (`graphql-ws` protocol)
//! - Operation selection in multi-operation documents
//! - Schema introspection
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_graphql::graphql::{GraphQLClient, GraphQLRequest};
//!
//! let client = GraphQLClient::new("https://api.example.com/graphql").build()?;
//!
//! let request = GraphQLRequest::new(r#"
//!     query GetUser($id: ID!) {
//!         user(id: $id) { id name email }
//!     }
//!     query ListUsers {
//!         users { id }
//!     }
//! "#)
//! .operation_name("GetUser")
//! .variable("id", "123");
//!
//! let response = client.execute(request).await?;
//! let user: User = response.field("user")?;
//! ```
//!
//! # Failures
//!
//! Every failed HTTP call yields [`ClientError::Query`](crate::ClientError::Query)
//! carrying a [`QueryFailure`], whether the server reported errors or the
//! request never produced a decodable response (message `"failed to fetch"`).

mod client;
mod document;
mod request;
mod response;
mod transport;

pub use client::{Execution, GraphQLClient, GraphQLClientBuilder};
pub use document::{ClassifiedDocument, classify};
pub use request::{GraphQLRequest, INTROSPECTION_QUERY, OperationKind};
pub use response::{GraphQLError, GraphQLLocation, GraphQLResponse, PathSegment, QueryFailure};
pub use transport::ResponseHook;
