//! GraphQL wire types exchanged between the gateway and the execution engine.
//!
//! These types are serialised as JSON over the public HTTP API. The gateway
//! never interprets query text; it only shapes requests on the way in and
//! errors on the way out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::upload::UploadedFile;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single GraphQL operation as received over HTTP.
///
/// `uploads` is populated by the gateway's multipart intake and never appears
/// on the wire; JSON requests always arrive with an empty upload list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// The operation source text.
    pub query: String,

    /// Which named operation to run when `query` contains several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Operation variables. Mapped upload locations are rewritten to upload
    /// references before the engine sees them.
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Files decoded from a multipart request, in map order.
    #[serde(skip)]
    pub uploads: Vec<UploadedFile>,
}

impl GraphQLRequest {
    /// Build a request from query text alone.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Map::new(),
            uploads: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A GraphQL execution result: data, errors, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// Resolved data, absent when the operation failed before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Execution errors, omitted from the wire when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    /// A response carrying only `data`.
    pub fn data(value: Value) -> Self {
        Self {
            data: Some(value),
            errors: Vec::new(),
        }
    }

    /// A response carrying a single error and no data.
    pub fn from_error(error: GraphQLError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable description of the failure.
    pub message: String,

    /// Path to the response field the error belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Free-form extensions map. The gateway's formatting pipeline redacts
    /// the `debug` and `exception` keys outside debug mode.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl GraphQLError {
    /// Build an error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: Map::new(),
        }
    }

    /// Attach an extensions entry, replacing any existing value for `key`.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Attach a machine-readable `code` extension.
    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", Value::String(code.to_owned()))
    }
}
