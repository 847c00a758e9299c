//! GraphQL client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::request::{GraphQLRequest, INTROSPECTION_QUERY, OperationKind};
use super::response::GraphQLResponse;
use super::transport::{HttpTransport, ResponseHook, merge_headers};
use crate::error::{ClientError, Result};
use crate::subscription::{
    self, ConnectionEvents, OperationHandler, ProtocolState, StartPayload, SubscriptionHandle,
    SubscriptionStream, GRAPHQL_WS_PROTOCOL,
};
use crate::websocket::{
    ConnectionParams, ConnectionSession, WebSocketOptions, derive_websocket_url,
    validate_websocket_url,
};

/// Builder for creating a GraphQL client.
pub struct GraphQLClientBuilder {
    endpoint: String,
    websocket_url: Option<String>,
    headers: HashMap<String, String>,
    parameters: ConnectionParams,
    sub_protocol: String,
    auto_reconnect: bool,
    resubscribe_on_reconnect: bool,
    request_timeout: Option<Duration>,
    connection_timeout: Duration,
    events: ConnectionEvents,
    response_hook: Option<ResponseHook>,
}

impl GraphQLClientBuilder {
    /// Create a new builder with the specified GraphQL endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            websocket_url: None,
            headers: HashMap::new(),
            parameters: ConnectionParams::default(),
            sub_protocol: GRAPHQL_WS_PROTOCOL.to_string(),
            auto_reconnect: false,
            resubscribe_on_reconnect: false,
            request_timeout: None,
            connection_timeout: Duration::from_secs(30),
            events: ConnectionEvents::default(),
            response_hook: None,
        }
    }

    /// Set a separate WebSocket URL for subscriptions.
    ///
    /// If not set, the endpoint URL is converted
    /// (http:// -> ws://, https:// -> wss://).
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Add a header sent with every request and every `connection_init`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add multiple headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set bearer token authentication.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Set the session parameters merged into `connection_init`.
    pub fn parameters(mut self, parameters: ConnectionParams) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the sub-protocol token requested during the WebSocket upgrade.
    pub fn sub_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.sub_protocol = protocol.into();
        self
    }

    /// Open a replacement connection when the current one closes.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Re-send the `start` frame of every active subscription after a
    /// reconnect is acknowledged.
    ///
    /// Off by default: subscriptions stay registered across a reconnect but
    /// receive nothing until they are started again.
    pub fn resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = enabled;
        self
    }

    /// Set the request timeout for HTTP operations.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the timeout for opening the WebSocket connection and for the
    /// handshake acknowledgment.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the connection lifecycle callbacks.
    pub fn events(mut self, events: ConnectionEvents) -> Self {
        self.events = events;
        self
    }

    /// Observe every decoded HTTP response body.
    pub fn response_hook(mut self, hook: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.response_hook = Some(Arc::new(hook));
        self
    }

    /// Build the GraphQL client.
    pub fn build(self) -> Result<GraphQLClient> {
        Url::parse(&self.endpoint)?;
        let websocket_url = match &self.websocket_url {
            Some(url) => validate_websocket_url(url)?,
            None => derive_websocket_url(&self.endpoint)?,
        };
        for (name, value) in &self.headers {
            HeaderName::try_from(name.as_str())?;
            HeaderValue::try_from(value.as_str())?;
        }

        let transport = HttpTransport::new(self.endpoint, self.request_timeout, self.response_hook)?;
        let websocket = WebSocketOptions::new(websocket_url)
            .sub_protocol(self.sub_protocol)
            .auto_reconnect(self.auto_reconnect)
            .resubscribe_on_reconnect(self.resubscribe_on_reconnect)
            .parameters(self.parameters)
            .connection_timeout(self.connection_timeout);

        Ok(GraphQLClient {
            inner: Arc::new(GraphQLClientInner {
                transport,
                websocket,
                headers: RwLock::new(self.headers),
                events: self.events,
                session: tokio::sync::Mutex::new(None),
            }),
        })
    }
}

struct GraphQLClientInner {
    transport: HttpTransport,
    websocket: WebSocketOptions,
    headers: RwLock<HashMap<String, String>>,
    events: ConnectionEvents,
    session: tokio::sync::Mutex<Option<Arc<ConnectionSession>>>,
}

impl Drop for GraphQLClientInner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.close();
        }
    }
}

/// Result of [`GraphQLClient::run`].
#[derive(Debug)]
pub enum Execution {
    /// A query or mutation answered over HTTP.
    Response(GraphQLResponse),
    /// A subscription running over the duplex connection.
    Subscription(SubscriptionStream),
}

/// A GraphQL client for queries, mutations, and subscriptions.
///
/// Queries and mutations are sent as HTTP POST requests. Subscriptions share
/// one WebSocket connection speaking `graphql-ws`, opened on first use.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
///
/// let client = GraphQLClient::new("https://api.example.com/graphql")
///     .bearer_auth("my-token")
///     .build()?;
///
/// // Execute a query
/// let response = client.execute(GraphQLRequest::new("{ users { id name } }")).await?;
///
/// // Subscribe to events
/// let mut stream = client
///     .subscribe(GraphQLRequest::new("subscription { events { id } }"))
///     .await?;
/// while let Some(message) = stream.next().await {
///     println!("{message:?}");
/// }
/// ```
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<GraphQLClientInner>,
}

impl GraphQLClient {
    /// Create a new builder with the specified endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> GraphQLClientBuilder {
        GraphQLClientBuilder::new(endpoint)
    }

    /// Create a new builder for configuring a GraphQL client.
    pub fn builder(endpoint: impl Into<String>) -> GraphQLClientBuilder {
        GraphQLClientBuilder::new(endpoint)
    }

    /// Get the HTTP endpoint URL.
    pub fn url(&self) -> &str {
        self.inner.transport.url()
    }

    /// Get the WebSocket URL for subscriptions.
    pub fn websocket_url(&self) -> &str {
        &self.inner.websocket.url
    }

    /// A copy of the current client headers.
    pub fn headers(&self) -> HashMap<String, String> {
        self.inner.headers.read().clone()
    }

    /// Execute a query or mutation over HTTP.
    ///
    /// The document is classified first; a subscription is rejected with
    /// [`ClientError::UnexpectedOperation`] before any network action.
    pub async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        self.execute_with_headers(request, HashMap::new()).await
    }

    /// Execute a query or mutation with extra headers for this call only.
    pub async fn execute_with_headers(
        &self,
        request: GraphQLRequest,
        headers: HashMap<String, String>,
    ) -> Result<GraphQLResponse> {
        let classified = request.classify()?;
        if classified.kind.is_long_lived() {
            return Err(ClientError::UnexpectedOperation {
                expected: OperationKind::Query,
                found: classified.kind,
            });
        }
        let request = request.reduced(&classified);
        let headers = merge_headers(&self.inner.headers.read(), &headers);
        self.inner.transport.execute(&request, &headers).await
    }

    /// Execute a query and parse the result.
    pub async fn query<T: DeserializeOwned>(&self, query: impl Into<String>) -> Result<T> {
        self.execute(GraphQLRequest::new(query)).await?.data()
    }

    /// Execute a query with variables and parse the result.
    pub async fn query_with_variables<T: DeserializeOwned>(
        &self,
        query: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        let request = GraphQLRequest::new(query).variables(variables);
        self.execute(request).await?.data()
    }

    /// Execute a mutation and parse the result.
    pub async fn mutate<T: DeserializeOwned>(&self, mutation: impl Into<String>) -> Result<T> {
        self.execute(GraphQLRequest::new(mutation)).await?.data()
    }

    /// Execute a mutation with variables and parse the result.
    pub async fn mutate_with_variables<T: DeserializeOwned>(
        &self,
        mutation: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        let request = GraphQLRequest::new(mutation).variables(variables);
        self.execute(request).await?.data()
    }

    /// Fetch the schema using introspection.
    pub async fn introspect(&self) -> Result<GraphQLResponse> {
        self.execute(GraphQLRequest::new(INTROSPECTION_QUERY)).await
    }

    /// Start a subscription and return a stream of its messages.
    ///
    /// This establishes the WebSocket connection (if not already connected)
    /// and waits for the handshake acknowledgment.
    pub async fn subscribe(&self, request: GraphQLRequest) -> Result<SubscriptionStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe_with(request, tx).await?;
        Ok(SubscriptionStream::new(rx, handle))
    }

    /// Start a subscription delivering its frames to `handler`.
    pub async fn subscribe_with(
        &self,
        request: GraphQLRequest,
        handler: impl OperationHandler,
    ) -> Result<SubscriptionHandle> {
        let classified = request.classify()?;
        if !classified.kind.is_long_lived() {
            return Err(ClientError::UnexpectedOperation {
                expected: OperationKind::Subscription,
                found: classified.kind,
            });
        }
        let payload = StartPayload::from(request.reduced(&classified));
        let session = self.session().await?;
        subscription::start(&session, payload, Arc::new(handler))
    }

    /// Classify the request and run it on the matching transport.
    pub async fn run(&self, request: GraphQLRequest) -> Result<Execution> {
        let kind = request.classify()?.kind;
        if kind.is_long_lived() {
            Ok(Execution::Subscription(self.subscribe(request).await?))
        } else {
            Ok(Execution::Response(self.execute(request).await?))
        }
    }

    /// Open the WebSocket connection and wait for the handshake
    /// acknowledgment.
    pub async fn connect(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// Replace the client headers.
    ///
    /// A live WebSocket connection is re-opened so the new headers are sent
    /// in a fresh `connection_init`.
    pub async fn update_headers(&self, headers: HashMap<String, String>) -> Result<()> {
        for (name, value) in &headers {
            HeaderName::try_from(name.as_str())?;
            HeaderValue::try_from(value.as_str())?;
        }
        *self.inner.headers.write() = headers.clone();
        if let Some(session) = self.inner.session.lock().await.as_ref() {
            session.update_headers(headers);
        }
        Ok(())
    }

    /// Identifiers of the subscriptions registered on the current
    /// connection.
    pub async fn active_subscriptions(&self) -> Vec<String> {
        match self.inner.session.lock().await.as_ref() {
            Some(session) => session.active_operations(),
            None => Vec::new(),
        }
    }

    /// State of the current WebSocket connection, if one was created.
    pub async fn protocol_state(&self) -> Option<ProtocolState> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.state())
    }

    /// Terminate the WebSocket connection.
    ///
    /// Active subscriptions receive a final "connection closed" error. A
    /// later subscription opens a new connection.
    pub async fn close(&self) {
        if let Some(session) = self.inner.session.lock().await.take() {
            tracing::debug!(target: "horizon_lattice_graphql::session", url = %session.url(), "closing connection");
            session.close();
        }
    }

    /// The live session, created and opened when absent.
    async fn session(&self) -> Result<Arc<ConnectionSession>> {
        let session = {
            let mut guard = self.inner.session.lock().await;
            let session = match guard.as_ref() {
                Some(session) if session.state() != ProtocolState::Terminated => session.clone(),
                _ => {
                    let session = ConnectionSession::new(
                        self.inner.websocket.clone(),
                        self.headers(),
                        self.inner.events.clone(),
                    );
                    *guard = Some(session.clone());
                    session
                }
            };
            session.open().await?;
            session
        };
        session.wait_ready().await?;
        Ok(session)
    }
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("url", &self.url())
            .field("websocket_url", &self.websocket_url())
            .finish()
    }
}
