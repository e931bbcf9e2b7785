//! Decoded file uploads and the variable references that point at them.

use bytes::Bytes;
use serde_json::{json, Value};

/// Extensions key marking a variable value as a reference into a request's
/// upload list.
pub const UPLOAD_REF_KEY: &str = "$upload";

/// One file decoded from a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name, or the part name when absent.
    pub filename: String,
    /// Declared media type of the part.
    pub content_type: String,
    /// The full decoded payload, bounded by the gateway's per-file ceiling.
    pub data: Bytes,
}

/// The variable value substituted at a mapped upload location.
///
/// Executors resolve it back to the request's upload list by index.
pub fn upload_ref(index: usize) -> Value {
    json!({ UPLOAD_REF_KEY: index })
}

/// Read an upload reference back out of a variable value.
pub fn as_upload_ref(value: &Value) -> Option<usize> {
    value
        .as_object()?
        .get(UPLOAD_REF_KEY)?
        .as_u64()
        .map(|i| i as usize)
}
