//! GraphQL response types.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;

use crate::error::{ClientError, Result};

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Attach extension metadata.
    pub fn with_extensions(mut self, extensions: Value) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Decode the payload of a remote `error` frame.
    ///
    /// Servers send either a single error object or a list of them; anything
    /// else is kept verbatim in the extensions of a single error.
    pub fn from_payload(payload: Value) -> Vec<Self> {
        match payload {
            Value::Array(items) => items.into_iter().flat_map(Self::from_payload).collect(),
            Value::Object(map) if map.get("message").is_some_and(Value::is_string) => {
                let object = Value::Object(map);
                match serde_json::from_value::<Self>(object.clone()) {
                    Ok(error) => vec![error],
                    Err(_) => vec![Self::opaque(object)],
                }
            }
            other => vec![Self::opaque(other)],
        }
    }

    fn opaque(payload: Value) -> Self {
        let message = match &payload {
            Value::String(text) => text.clone(),
            _ => "Unknown error".to_string(),
        };
        Self::new(message).with_extensions(serde_json::json!({ "payload": payload }))
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{}", name)?,
                    PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                }
            }
            write!(f, ")")?;
        }
        if !self.locations.is_empty() {
            let locations = self
                .locations
                .iter()
                .map(|l| format!("line: {}, column: {}", l.line, l.column))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "\n{locations}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// A GraphQL response from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors that occurred during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Additional response metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if the response was successful (has data and no errors).
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.errors.is_empty()
    }

    /// Get all errors as a combined message.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(
                self.errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }

    /// Parse the data as a specific type.
    ///
    /// Returns an error if the response has errors or if parsing fails.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        if self.has_errors() {
            return Err(QueryFailure::from(self.clone()).into());
        }

        match &self.data {
            Some(data) => serde_json::from_value(data.clone()).map_err(|e| {
                ClientError::Json(format!("Failed to deserialize GraphQL response: {}", e))
            }),
            None => Err(ClientError::Json("No data in GraphQL response".into())),
        }
    }

    /// Parse a specific field from the data.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // For a response like: { "data": { "user": { "id": "1", "name": "John" } } }
    /// let user: User = response.field("user")?;
    /// ```
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        if self.has_errors() {
            return Err(QueryFailure::from(self.clone()).into());
        }

        match &self.data {
            Some(Value::Object(data)) => {
                let field_value = data.get(field).ok_or_else(|| {
                    ClientError::Json(format!("Field '{}' not found in response", field))
                })?;
                serde_json::from_value(field_value.clone()).map_err(|e| {
                    ClientError::Json(format!("Failed to deserialize field '{}': {}", field, e))
                })
            }
            Some(_) => Err(ClientError::Json("Response data is not an object".into())),
            None => Err(ClientError::Json("No data in GraphQL response".into())),
        }
    }

    /// Convert errors to a Result.
    ///
    /// Returns `Ok(self)` if no errors, or the normalized failure otherwise.
    pub fn into_result(self) -> std::result::Result<Self, QueryFailure> {
        if self.has_errors() {
            Err(QueryFailure::from(self))
        } else {
            Ok(self)
        }
    }
}

/// A failed request/reply call.
///
/// Every failure, whether the server reported GraphQL errors or the request
/// never produced a decodable response, has this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    /// Partial data, if the server returned any.
    #[serde(default)]
    pub data: Option<Value>,
    /// The errors. Never empty.
    pub errors: Vec<GraphQLError>,
}

impl QueryFailure {
    /// Message used when no GraphQL response could be obtained.
    pub const FETCH_FAILED: &'static str = "failed to fetch";

    /// A transport-level failure with its underlying cause.
    pub fn fetch_failed(cause: impl fmt::Display) -> Self {
        Self {
            data: None,
            errors: vec![
                GraphQLError::new(Self::FETCH_FAILED)
                    .with_extensions(serde_json::json!({ "cause": cause.to_string() })),
            ],
        }
    }

    /// Whether the request failed before a GraphQL response was decoded.
    pub fn is_fetch_failure(&self) -> bool {
        self.data.is_none()
            && self.errors.len() == 1
            && self.errors[0].message == Self::FETCH_FAILED
    }
}

impl From<GraphQLResponse> for QueryFailure {
    fn from(response: GraphQLResponse) -> Self {
        Self {
            data: response.data,
            errors: response.errors,
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphQL error: ")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_successful_response() {
        let response = GraphQLResponse {
            data: Some(json!({"user": {"id": "1", "name": "John"}})),
            errors: vec![],
            extensions: None,
        };

        assert!(response.is_success());
        assert!(!response.has_errors());
    }

    #[test]
    fn test_error_response() {
        let response = GraphQLResponse {
            data: None,
            errors: vec![GraphQLError {
                message: "User not found".to_string(),
                locations: vec![GraphQLLocation { line: 1, column: 1 }],
                path: Some(vec![PathSegment::Field("user".to_string())]),
                extensions: None,
            }],
            extensions: None,
        };

        assert!(!response.is_success());
        assert!(response.has_errors());
        assert_eq!(response.error_message(), Some("User not found".to_string()));
    }

    #[test]
    fn test_parse_field() {
        let response = GraphQLResponse {
            data: Some(json!({"user": {"id": "1", "name": "John"}})),
            errors: vec![],
            extensions: None,
        };

        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: String,
            name: String,
        }

        let user: User = response.field("user").unwrap();
        assert_eq!(user.id, "1");
        assert_eq!(user.name, "John");
    }

    #[test]
    fn test_partial_response() {
        // GraphQL can return partial data with errors
        let response = GraphQLResponse {
            data: Some(json!({"user": null})),
            errors: vec![GraphQLError::new("Permission denied")],
            extensions: None,
        };

        assert!(response.has_errors());
        let err = response.data::<Value>().unwrap_err();
        let failure = err.as_query_failure().unwrap();
        assert_eq!(failure.data, Some(json!({"user": null})));
        assert_eq!(failure.errors[0].message, "Permission denied");
    }

    #[test]
    fn test_error_display_with_locations() {
        let error = GraphQLError {
            message: "Syntax Error".to_string(),
            locations: vec![
                GraphQLLocation { line: 1, column: 5 },
                GraphQLLocation { line: 2, column: 1 },
            ],
            path: None,
            extensions: None,
        };
        assert_eq!(
            error.to_string(),
            "Syntax Error\nline: 1, column: 5,line: 2, column: 1"
        );
    }

    #[test]
    fn test_errors_from_frame_payload() {
        let single = GraphQLError::from_payload(json!({"message": "boom"}));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].message, "boom");

        let many = GraphQLError::from_payload(json!([{"message": "a"}, {"message": "b"}]));
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].message, "b");

        let opaque = GraphQLError::from_payload(json!({"code": 42}));
        assert_eq!(opaque.len(), 1);
        assert_eq!(opaque[0].message, "Unknown error");
        assert_eq!(opaque[0].extensions, Some(json!({"payload": {"code": 42}})));
    }

    #[test]
    fn test_fetch_failure_shape() {
        let failure = QueryFailure::fetch_failed("connection refused");
        assert!(failure.is_fetch_failure());
        assert_eq!(failure.errors[0].message, "failed to fetch");
        assert_eq!(
            failure.errors[0].extensions,
            Some(json!({"cause": "connection refused"}))
        );
    }
}
