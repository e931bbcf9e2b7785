//! Multipart upload intake for the API mount path.
//!
//! Decodes the GraphQL multipart convention ahead of the engine: an
//! `operations` field carrying the request JSON, a `map` field associating
//! file parts with variable locations, then the file parts themselves. Each
//! file is read under the configured per-file ceiling; crossing it aborts
//! the request with a client-visible error before any more of the stream is
//! buffered. Mapped variable locations are rewritten to upload references
//! and the decoded files travel to the engine on the request.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use common::upload::upload_ref;
use common::{GraphQLRequest, UploadedFile};

use super::handlers::graphql_error_response;
use super::state::ApiState;

/// The decoded multipart request, attached to the request's extensions for
/// the API handler.
#[derive(Clone)]
pub struct DecodedOperations(pub GraphQLRequest);

/// Errors from decoding a multipart request.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// A file part crossed the per-file ceiling.
    #[error("file exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: u64 },

    /// No `operations` field was present.
    #[error("multipart request is missing the operations field")]
    MissingOperations,

    /// No `map` field was present.
    #[error("multipart request is missing the map field")]
    MissingMap,

    /// A field was present but unusable.
    #[error("invalid {field} field: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A file part was not named by the map.
    #[error("file part {0} has no map entry")]
    UnmappedFile(String),

    /// The multipart stream itself could not be read.
    #[error("malformed multipart body: {0}")]
    Malformed(String),
}

impl IntakeError {
    fn status(&self) -> StatusCode {
        match self {
            IntakeError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            IntakeError::FileTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            _ => "BAD_REQUEST",
        }
    }
}

/// Middleware wrapping the API mount path.
///
/// Multipart requests are decoded and replaced with an empty-bodied request
/// carrying [`DecodedOperations`]; everything else passes through untouched.
pub async fn intake(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if !is_multipart(&request) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let multipart_request = Request::from_parts(parts.clone(), body);
    let multipart = match Multipart::from_request(multipart_request, &()).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(error = %rejection, "rejected multipart body");
            return graphql_error_response(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "malformed multipart request body",
            );
        }
    };

    match decode(multipart, state.max_file_size).await {
        Ok(operations) => {
            debug!(uploads = operations.uploads.len(), "multipart request decoded");
            let mut request = Request::from_parts(parts, Body::empty());
            request.extensions_mut().insert(DecodedOperations(operations));
            next.run(request).await
        }
        Err(error) => {
            warn!(error = %error, "upload intake rejected request");
            graphql_error_response(error.status(), error.code(), error.to_string())
        }
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Decode a multipart stream into a [`GraphQLRequest`] with its uploads.
///
/// # Errors
///
/// Returns [`IntakeError`] for oversize files, missing or invalid
/// `operations`/`map` fields, unmapped file parts, and unreadable streams.
pub async fn decode(
    mut multipart: Multipart,
    max_file_size: u64,
) -> Result<GraphQLRequest, IntakeError> {
    let mut operations: Option<Value> = None;
    let mut map: Option<HashMap<String, Vec<String>>> = None;
    let mut files: Vec<(String, UploadedFile)> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|error| IntakeError::Malformed(error.to_string()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            return Err(IntakeError::Malformed("unnamed multipart field".into()));
        };
        match name.as_str() {
            "operations" => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| IntakeError::Malformed(error.to_string()))?;
                operations = Some(serde_json::from_str(&text).map_err(|error| {
                    IntakeError::InvalidField { field: "operations", reason: error.to_string() }
                })?);
            }
            "map" => {
                let text = field
                    .text()
                    .await
                    .map_err(|error| IntakeError::Malformed(error.to_string()))?;
                map = Some(serde_json::from_str(&text).map_err(|error| {
                    IntakeError::InvalidField { field: "map", reason: error.to_string() }
                })?);
            }
            _ => {
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .unwrap_or_else(|| name.clone());
                let content_type = field
                    .content_type()
                    .map(str::to_owned)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = read_bounded(&mut field, max_file_size).await?;
                files.push((name, UploadedFile { filename, content_type, data }));
            }
        }
    }

    let operations = operations.ok_or(IntakeError::MissingOperations)?;
    let mut request: GraphQLRequest = serde_json::from_value(operations).map_err(|error| {
        IntakeError::InvalidField { field: "operations", reason: error.to_string() }
    })?;
    let map = map.ok_or(IntakeError::MissingMap)?;

    for (index, (part, file)) in files.into_iter().enumerate() {
        let Some(locations) = map.get(&part) else {
            return Err(IntakeError::UnmappedFile(part));
        };
        for location in locations {
            set_variable(&mut request, location, upload_ref(index))?;
        }
        request.uploads.push(file);
    }
    Ok(request)
}

/// Read one field, failing as soon as the accumulated size crosses `limit`.
async fn read_bounded(field: &mut Field<'_>, limit: u64) -> Result<Bytes, IntakeError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|error| IntakeError::Malformed(error.to_string()))?
    {
        if (data.len() + chunk.len()) as u64 > limit {
            return Err(IntakeError::FileTooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

/// Rewrite one mapped location under `variables.` to `value`.
fn set_variable(
    request: &mut GraphQLRequest,
    location: &str,
    value: Value,
) -> Result<(), IntakeError> {
    let Some(rest) = location.strip_prefix("variables.") else {
        return Err(IntakeError::InvalidField {
            field: "map",
            reason: format!("location must target variables: {location}"),
        });
    };

    let mut segments = rest.split('.');
    let first = segments.next().unwrap_or_default();
    if first.is_empty() {
        return Err(IntakeError::InvalidField {
            field: "map",
            reason: format!("empty location segment: {location}"),
        });
    }
    let segments: Vec<&str> = segments.collect();

    if segments.is_empty() {
        request.variables.insert(first.to_owned(), value);
        return Ok(());
    }

    let root = request
        .variables
        .entry(first.to_owned())
        .or_insert(Value::Null);
    let slot = navigate(root, &segments, location)?;
    *slot = value;
    Ok(())
}

fn navigate<'a>(
    mut current: &'a mut Value,
    segments: &[&str],
    location: &str,
) -> Result<&'a mut Value, IntakeError> {
    for segment in segments {
        if segment.is_empty() {
            return Err(IntakeError::InvalidField {
                field: "map",
                reason: format!("empty location segment: {location}"),
            });
        }
        current = match segment.parse::<usize>() {
            Ok(index) => match current {
                Value::Array(items) => items.get_mut(index).ok_or_else(|| {
                    IntakeError::InvalidField {
                        field: "map",
                        reason: format!("index {index} out of bounds in {location}"),
                    }
                })?,
                _ => {
                    return Err(IntakeError::InvalidField {
                        field: "map",
                        reason: format!("expected an array at {segment} in {location}"),
                    })
                }
            },
            Err(_) => {
                if current.is_null() {
                    *current = Value::Object(serde_json::Map::new());
                }
                match current {
                    Value::Object(object) => {
                        object.entry((*segment).to_owned()).or_insert(Value::Null)
                    }
                    _ => {
                        return Err(IntakeError::InvalidField {
                            field: "map",
                            reason: format!("expected an object at {segment} in {location}"),
                        })
                    }
                }
            }
        };
    }
    Ok(current)
}
