//! Request/reply transport: one GraphQL operation per HTTP POST.
//!
//! The transport keeps no state across calls and has no retry policy; a
//! single attempt either yields a response or a [`QueryFailure`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::request::GraphQLRequest;
use super::response::{GraphQLResponse, QueryFailure};
use crate::error::{ClientError, Result};

/// Callback invoked with every decoded response body.
pub type ResponseHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Merge per-call headers over the client headers.
pub(crate) fn merge_headers(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Whether any header name is `Content-Type`, ignoring case.
pub(crate) fn has_content_type(headers: &HashMap<String, String>) -> bool {
    headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
}

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    url: String,
    response_hook: Option<ResponseHook>,
}

impl HttpTransport {
    pub(crate) fn new(
        url: impl Into<String>,
        timeout: Option<Duration>,
        response_hook: Option<ResponseHook>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(format!(
            "HorizonLattice-GraphQL/{} (Rust)",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            response_hook,
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Execute one request with the given (already merged) headers.
    pub(crate) async fn execute(
        &self,
        request: &GraphQLRequest,
        headers: &HashMap<String, String>,
    ) -> Result<GraphQLResponse> {
        let headers = Self::header_map(headers)?;
        let body = GraphQLRequest {
            variables: Some(request.variables_or_default()),
            ..request.clone()
        };
        let body = serde_json::to_vec(&body)?;

        tracing::debug!(
            target: "horizon_lattice_graphql::http",
            url = %self.url,
            operation = ?request.operation_name,
            "sending request"
        );

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(Self::fetch_failed)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(Self::fetch_failed)?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| Self::fetch_failed(format!("HTTP {status}: {e}")))?;

        if let Some(hook) = &self.response_hook {
            hook(&value);
        }

        let response: GraphQLResponse =
            serde_json::from_value(value).map_err(|e| Self::fetch_failed(format!("HTTP {status}: {e}")))?;

        if response.has_errors() {
            return Err(QueryFailure::from(response).into());
        }
        if !status.is_success() && response.data.is_none() {
            return Err(Self::fetch_failed(format!("HTTP {status}")));
        }
        Ok(response)
    }

    fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers {
            map.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }
        if !has_content_type(headers) {
            map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(map)
    }

    fn fetch_failed(cause: impl fmt::Display) -> ClientError {
        tracing::debug!(target: "horizon_lattice_graphql::http", %cause, "request failed");
        QueryFailure::fetch_failed(cause).into()
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("response_hook", &self.response_hook.is_some())
            .finish()
    }
}
