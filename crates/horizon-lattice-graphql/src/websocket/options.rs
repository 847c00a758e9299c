//! Duplex connection options and physical handle state.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ClientError, Result};
use crate::subscription::GRAPHQL_WS_PROTOCOL;

/// Current state of the physical duplex handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HandleState {
    /// No handle has been opened yet.
    #[default]
    Disconnected,
    /// Opening the first handle.
    Connecting,
    /// A handle is open.
    Connected,
    /// The previous handle closed; opening a replacement.
    Reconnecting,
    /// The handle is closed for good.
    Closed,
}

/// Session parameters sent with every `connection_init` frame.
///
/// A `headers` entry, when present, must be an object; its fields override
/// the client headers of the same name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(Map<String, Value>);

impl ConnectionParams {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one parameter.
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get one parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build the `connection_init` payload: every parameter, plus a
    /// `headers` object holding the client headers overridden by the
    /// parameters' own `headers`.
    pub fn init_payload(&self, headers: &HashMap<String, String>) -> Value {
        let mut merged: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if let Some(Value::Object(overrides)) = self.0.get("headers") {
            merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut payload = self.0.clone();
        payload.insert("headers".to_string(), Value::Object(merged));
        Value::Object(payload)
    }
}

impl From<Map<String, Value>> for ConnectionParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Configuration of the duplex connection.
#[derive(Clone, Debug)]
pub struct WebSocketOptions {
    /// The WebSocket URL (ws:// or wss://).
    pub url: String,
    /// Sub-protocol token requested during the upgrade.
    pub sub_protocol: String,
    /// Open a replacement handle when the current one closes.
    pub auto_reconnect: bool,
    /// Replay active operations after a reconnect is acknowledged.
    pub resubscribe_on_reconnect: bool,
    /// Parameters merged into the `connection_init` payload.
    pub parameters: ConnectionParams,
    /// Bound on opening the handle and on waiting for `connection_ack`.
    pub connection_timeout: Duration,
}

impl WebSocketOptions {
    /// Options for the given URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sub_protocol: GRAPHQL_WS_PROTOCOL.to_string(),
            auto_reconnect: false,
            resubscribe_on_reconnect: false,
            parameters: ConnectionParams::default(),
            connection_timeout: Duration::from_secs(30),
        }
    }

    /// Set the sub-protocol token requested during the upgrade.
    pub fn sub_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.sub_protocol = protocol.into();
        self
    }

    /// Open a replacement handle when the current one closes.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Replay active operations once a replacement handle is acknowledged.
    pub fn resubscribe_on_reconnect(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = enabled;
        self
    }

    /// Set the parameters sent with `connection_init`.
    pub fn parameters(mut self, parameters: ConnectionParams) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the bound on opening the handle and on the acknowledgment.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Derive the duplex URL from the request/reply endpoint.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws` and `wss` URLs are
/// returned unchanged.
pub fn derive_websocket_url(endpoint: &str) -> Result<String> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {endpoint}"
            )));
        }
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(endpoint.to_string()))?;
    }
    Ok(url.to_string())
}

/// Validate an explicit duplex URL.
pub(crate) fn validate_websocket_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(ClientError::InvalidUrl(format!(
            "expected ws or wss scheme, found '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_websocket_url() {
        assert_eq!(
            derive_websocket_url("http://localhost:4000/graphql").unwrap(),
            "ws://localhost:4000/graphql"
        );
        assert_eq!(
            derive_websocket_url("https://example.test/graphql?x=1").unwrap(),
            "wss://example.test/graphql?x=1"
        );
        assert_eq!(
            derive_websocket_url("wss://example.test/graphql").unwrap(),
            "wss://example.test/graphql"
        );
        assert!(matches!(
            derive_websocket_url("ftp://example.test"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            derive_websocket_url("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_websocket_url() {
        assert!(validate_websocket_url("ws://127.0.0.1:9000/").is_ok());
        assert!(validate_websocket_url("https://example.test").is_err());
    }

    #[test]
    fn test_init_payload_merges_headers() {
        let headers = HashMap::from([
            ("Authorization".to_string(), "Bearer client".to_string()),
            ("x-team".to_string(), "core".to_string()),
        ]);
        let params = ConnectionParams::new()
            .insert("lazy", true)
            .insert("headers", json!({"Authorization": "Bearer session"}));

        assert_eq!(
            params.init_payload(&headers),
            json!({
                "lazy": true,
                "headers": {
                    "Authorization": "Bearer session",
                    "x-team": "core"
                }
            })
        );
    }

    #[test]
    fn test_init_payload_without_parameters() {
        let headers = HashMap::from([("x-team".to_string(), "core".to_string())]);
        assert_eq!(
            ConnectionParams::new().init_payload(&headers),
            json!({"headers": {"x-team": "core"}})
        );
        assert_eq!(
            ConnectionParams::new().init_payload(&HashMap::new()),
            json!({"headers": {}})
        );
    }

    #[test]
    fn test_option_defaults() {
        let options = WebSocketOptions::new("ws://localhost/graphql");
        assert_eq!(options.sub_protocol, "graphql-ws");
        assert!(!options.auto_reconnect);
        assert!(!options.resubscribe_on_reconnect);
        assert!(options.parameters.is_empty());
        assert_eq!(options.connection_timeout, Duration::from_secs(30));
    }
}
