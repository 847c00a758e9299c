//! Long-lived operations multiplexed over one duplex connection.
//!
//! Operations are started with a `start` frame carrying a connection-unique
//! identifier and are routed back by that identifier:
//!
//! - [`OperationHandler`] receives the frames of one operation;
//! - [`SubscriptionStream`] and [`SubscriptionCallbacks`] are the provided
//!   handlers;
//! - [`SubscriptionHandle::cancel`] stops an operation;
//! - [`ConnectionEvents`] observes the connection itself.
//!
//! The wire format is the `graphql-ws` sub-protocol:
//!
//! | client | server |
//! |---|---|
//! | `connection_init`, `start`, `stop`, `connection_terminate` | `connection_ack`, `connection_error`, `ka`, `data`, `error`, `complete` |

mod dispatcher;
mod events;
mod frame;
mod handle;
mod registry;

pub(crate) use dispatcher::Dispatcher;
pub use dispatcher::ProtocolState;
pub use events::{ConnectionError, ConnectionEvents, OnConnectionErrorCallback, OnEventCallback};
pub use frame::{ClientFrame, GRAPHQL_WS_PROTOCOL, ServerFrame, StartPayload};
pub(crate) use handle::start;
pub use handle::{
    OperationHandler, SubscriptionCallbacks, SubscriptionHandle, SubscriptionMessage,
    SubscriptionStream,
};
pub(crate) use registry::{OperationEntry, OperationRegistry};
