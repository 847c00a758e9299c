//! Subscription façade: starting long-lived operations and cancelling them.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::frame::{ClientFrame, StartPayload};
use crate::error::Result;
use crate::graphql::{GraphQLError, GraphQLResponse};
use crate::websocket::ConnectionSession;

/// Receives the frames routed to one operation.
///
/// Methods are called from the connection task, one frame at a time, in the
/// order the frames arrived. Implementations should not block.
pub trait OperationHandler: Send + Sync + 'static {
    /// A `data` frame arrived.
    fn on_data(&self, response: GraphQLResponse);

    /// An `error` frame arrived, or the connection terminated while the
    /// operation was active. The operation stays registered after an
    /// `error` frame; cancel it if the error is terminal.
    fn on_error(&self, errors: Vec<GraphQLError>);

    /// The server completed the operation.
    fn on_complete(&self);
}

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionMessage {
    /// Data received from the subscription.
    Data(GraphQLResponse),
    /// An error reported for the subscription.
    Error(Vec<GraphQLError>),
    /// The subscription completed.
    Complete,
}

impl OperationHandler for mpsc::UnboundedSender<SubscriptionMessage> {
    fn on_data(&self, response: GraphQLResponse) {
        let _ = self.send(SubscriptionMessage::Data(response));
    }

    fn on_error(&self, errors: Vec<GraphQLError>) {
        let _ = self.send(SubscriptionMessage::Error(errors));
    }

    fn on_complete(&self) {
        let _ = self.send(SubscriptionMessage::Complete);
    }
}

type DataCallback = Box<dyn Fn(GraphQLResponse) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(Vec<GraphQLError>) + Send + Sync>;
type CompleteCallback = Box<dyn Fn() + Send + Sync>;

/// Closure-based [`OperationHandler`].
///
/// ```ignore
/// let callbacks = SubscriptionCallbacks::new()
///     .on_data(|response| println!("{:?}", response.data))
///     .on_error(|errors| eprintln!("{} errors", errors.len()));
/// let handle = client.subscribe_with(request, callbacks).await?;
/// ```
#[derive(Default)]
pub struct SubscriptionCallbacks {
    on_data: Option<DataCallback>,
    on_error: Option<ErrorCallback>,
    on_complete: Option<CompleteCallback>,
}

impl SubscriptionCallbacks {
    /// Create a handler with no callbacks set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for each result.
    pub fn on_data(mut self, f: impl Fn(GraphQLResponse) + Send + Sync + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    /// Called for each error report.
    pub fn on_error(mut self, f: impl Fn(Vec<GraphQLError>) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called when the server completes the operation.
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl OperationHandler for SubscriptionCallbacks {
    fn on_data(&self, response: GraphQLResponse) {
        if let Some(cb) = &self.on_data {
            cb(response);
        }
    }

    fn on_error(&self, errors: Vec<GraphQLError>) {
        if let Some(cb) = &self.on_error {
            cb(errors);
        }
    }

    fn on_complete(&self) {
        if let Some(cb) = &self.on_complete {
            cb();
        }
    }
}

impl fmt::Debug for SubscriptionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCallbacks")
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Cancellation handle of one long-lived operation.
///
/// Cloning the handle does not duplicate the operation.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: String,
    session: Arc<ConnectionSession>,
}

impl SubscriptionHandle {
    /// The operation identifier, unique on its connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the operation is still registered.
    pub fn is_active(&self) -> bool {
        self.session.registry().lock().lookup(&self.id).is_some()
    }

    /// Stop the operation.
    ///
    /// Sends a `stop` frame and removes the operation at once; frames that
    /// were already in flight for it are discarded. Each call sends a
    /// `stop` frame, even when the operation has already finished.
    pub fn cancel(&self) {
        self.session.send(&ClientFrame::Stop {
            id: self.id.clone(),
        });
        let removed = self.session.registry().lock().remove(&self.id).is_some();
        tracing::debug!(
            target: "horizon_lattice_graphql::subscription",
            id = %self.id,
            removed,
            "operation cancelled"
        );
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

/// A stream of subscription messages.
///
/// Dropping the stream cancels the operation unless it already finished.
pub struct SubscriptionStream {
    receiver: mpsc::UnboundedReceiver<SubscriptionMessage>,
    handle: SubscriptionHandle,
    finished: bool,
}

impl SubscriptionStream {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<SubscriptionMessage>,
        handle: SubscriptionHandle,
    ) -> Self {
        Self {
            receiver,
            handle,
            finished: false,
        }
    }

    /// Get the next message from the subscription.
    ///
    /// Returns `None` once the subscription completed or was stopped.
    pub async fn next(&mut self) -> Option<SubscriptionMessage> {
        if self.finished {
            return None;
        }
        let message = self.receiver.recv().await;
        match message {
            Some(SubscriptionMessage::Complete) | None => self.finished = true,
            Some(_) => {}
        }
        message
    }

    /// Stop the subscription.
    pub fn stop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.handle.cancel();
        }
    }

    /// Get the subscription ID.
    pub fn id(&self) -> &str {
        self.handle.id()
    }

    /// The cancellation handle of this subscription.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("id", &self.handle.id)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Register an operation on a live session and send its `start` frame.
///
/// Fails with [`NotConnected`](crate::ClientError::NotConnected) when no
/// live handle accepts the frame; the operation is not registered then.
pub(crate) fn start(
    session: &Arc<ConnectionSession>,
    payload: StartPayload,
    handler: Arc<dyn OperationHandler>,
) -> Result<SubscriptionHandle> {
    let operation = payload.operation_name.clone();
    let (id, active) = match session.start_operation(payload, handler) {
        Ok(started) => started,
        Err(e) => {
            tracing::warn!(
                target: "horizon_lattice_graphql::subscription",
                error = %e,
                "operation not started"
            );
            return Err(e);
        }
    };

    tracing::debug!(
        target: "horizon_lattice_graphql::subscription",
        id = %id,
        ?operation,
        active,
        "started operation"
    );

    Ok(SubscriptionHandle {
        id,
        session: session.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_channel_handler_forwards_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let response: GraphQLResponse =
            serde_json::from_value(json!({"data": {"onCreate": {"id": "1"}}})).unwrap();

        tx.on_data(response.clone());
        tx.on_error(vec![GraphQLError::new("denied")]);
        tx.on_complete();

        assert_eq!(rx.recv().await, Some(SubscriptionMessage::Data(response)));
        assert_eq!(
            rx.recv().await,
            Some(SubscriptionMessage::Error(vec![GraphQLError::new("denied")]))
        );
        assert_eq!(rx.recv().await, Some(SubscriptionMessage::Complete));
    }

    #[test]
    fn test_channel_handler_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<SubscriptionMessage>();
        drop(rx);
        tx.on_complete();
    }

    #[test]
    fn test_callbacks() {
        let count = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (count.clone(), count.clone());
        let callbacks = SubscriptionCallbacks::new()
            .on_data(move |_| {
                c1.fetch_add(1, Ordering::SeqCst);
            })
            .on_complete(move || {
                c2.fetch_add(10, Ordering::SeqCst);
            });

        OperationHandler::on_data(&callbacks, GraphQLResponse::default());
        OperationHandler::on_error(&callbacks, vec![GraphQLError::new("unhandled")]);
        OperationHandler::on_complete(&callbacks);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
