//! GraphQL operation and response wire types.
//!
//! `Operation` is what callers build; `OperationPayload` is the adapted form
//! actually sent on either transport. The payload always carries a `query`
//! string: an absent or empty query is coalesced to `""` so the node sees a
//! well-formed (if vacuous) request rather than a missing field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Operation ───────────────────────────────────────────────────────────────

/// A GraphQL operation as built by the caller.
///
/// The query text is optional at this level; `payload()` normalizes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl Operation {
    /// An operation with just a query document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            variables: None,
            operation_name: None,
        }
    }

    /// Attach variables.
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Name the operation to execute within a multi-operation document.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Adapt this operation into its wire form.
    ///
    /// An absent or empty `query` becomes `""`; a non-empty query passes
    /// through unchanged.
    pub fn payload(&self) -> OperationPayload {
        OperationPayload {
            query: self.query.clone().unwrap_or_default(),
            variables: self.variables.clone(),
            operation_name: self.operation_name.clone(),
        }
    }
}

impl From<&str> for Operation {
    fn from(query: &str) -> Self {
        Operation::new(query)
    }
}

impl From<String> for Operation {
    fn from(query: String) -> Self {
        Operation::new(query)
    }
}

// ─── OperationPayload ────────────────────────────────────────────────────────

/// The adapted request body sent to the node.
///
/// This is the standard GraphQL-over-HTTP request shape, also used verbatim
/// as the `subscribe` payload on the WebSocket transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl OperationPayload {
    /// Stable string form used as a cache key.
    pub fn cache_key(&self) -> String {
        // Field order is fixed by the struct, so serialization is stable.
        serde_json::to_string(self).unwrap_or_else(|_| self.query.clone())
    }
}

// ─── Response ────────────────────────────────────────────────────────────────

/// A GraphQL execution result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl Response {
    /// Whether the execution produced any errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Extract the data, turning execution errors into `Err`.
    pub fn into_data(self) -> Result<Option<Value>, Vec<GraphQlError>> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            Err(self.errors)
        }
    }
}

/// A single error from the `errors` array of an execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

impl std::fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A source position referenced by an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_coalesces_missing_query() {
        let op = Operation::default();
        assert_eq!(op.payload().query, "");
    }

    #[test]
    fn test_payload_coalesces_empty_query() {
        let op = Operation::new("");
        assert_eq!(op.payload().query, "");
    }

    #[test]
    fn test_payload_preserves_nonempty_query() {
        let op = Operation::new("{ accounts { owner } }");
        assert_eq!(op.payload().query, "{ accounts { owner } }");
    }

    #[test]
    fn test_payload_null_query_from_json() {
        // A request deserialized with `"query": null` adapts to "".
        let op: Operation = serde_json::from_str(r#"{"query": null}"#).unwrap();
        assert_eq!(op.payload().query, "");
    }

    #[test]
    fn test_payload_wire_shape() {
        let op = Operation::new("query Accounts { accounts }")
            .with_variables(json!({"owner": "alice"}))
            .with_operation_name("Accounts");
        let wire = serde_json::to_value(op.payload()).unwrap();

        assert_eq!(wire["query"], "query Accounts { accounts }");
        assert_eq!(wire["variables"]["owner"], "alice");
        assert_eq!(wire["operationName"], "Accounts");
    }

    #[test]
    fn test_payload_omits_absent_fields() {
        let wire = serde_json::to_value(Operation::new("{ x }").payload()).unwrap();
        assert!(wire.get("variables").is_none());
        assert!(wire.get("operationName").is_none());
    }

    #[test]
    fn test_cache_key_distinguishes_variables() {
        let a = Operation::new("{ x }").payload();
        let b = Operation::new("{ x }")
            .with_variables(json!({"n": 1}))
            .payload();
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), Operation::new("{ x }").payload().cache_key());
    }

    #[test]
    fn test_response_into_data_ok() {
        let resp: Response =
            serde_json::from_str(r#"{"data": {"value": 7}}"#).unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.into_data().unwrap(), Some(json!({"value": 7})));
    }

    #[test]
    fn test_response_into_data_err() {
        let resp: Response = serde_json::from_str(
            r#"{"data": null, "errors": [{"message": "boom", "locations": [{"line": 1, "column": 3}]}]}"#,
        )
        .unwrap();
        assert!(!resp.is_ok());
        let errs = resp.into_data().unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "boom");
        assert_eq!(errs[0].locations[0].line, 1);
    }
}
