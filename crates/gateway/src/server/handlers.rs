//! Request handlers for the API mount path.
//!
//! Accepts JSON POST bodies, decoded multipart requests (via the intake
//! middleware), and GET requests carrying a `query` parameter. Browser GETs
//! without a query receive the landing page when one is selected. Transport
//! failures are shaped as GraphQL error bodies so clients see one error
//! format everywhere.

use std::collections::HashMap;

use axum::body;
use axum::extract::{Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::debug;

use common::{GraphQLError, GraphQLRequest, GraphQLResponse};

use super::state::ApiState;
use super::uploads::DecodedOperations;

/// Shape a transport-level failure as a GraphQL error body.
pub(crate) fn graphql_error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Response {
    let body = GraphQLResponse::from_error(GraphQLError::new(message).with_code(code));
    (status, Json(body)).into_response()
}

/// The single handler behind the API mount path.
pub async fn graphql(State(state): State<ApiState>, request: Request) -> Response {
    if request.method() == Method::GET {
        handle_get(state, request).await
    } else if request.method() == Method::POST {
        handle_post(state, request).await
    } else {
        graphql_error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "only GET and POST are supported",
        )
    }
}

/// JSON fallback terminating the routing chain.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "not_found",
            "message": "the requested resource does not exist",
        })),
    )
}

async fn handle_get(state: ApiState, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let params = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(params)| params)
        .unwrap_or_default();

    if let Some(query) = params.get("query") {
        let mut gql = GraphQLRequest::new(query.clone());
        gql.operation_name = params.get("operationName").cloned();
        if let Some(variables) = params.get("variables") {
            match serde_json::from_str::<Map<String, Value>>(variables) {
                Ok(variables) => gql.variables = variables,
                Err(error) => {
                    return graphql_error_response(
                        StatusCode::BAD_REQUEST,
                        "BAD_REQUEST",
                        format!("variables is not valid JSON: {error}"),
                    )
                }
            }
        }
        return execute(state, parts, gql).await;
    }

    match state.engine.landing_page() {
        Some(page) => Html(page).into_response(),
        None => graphql_error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "GET requests without a query are not supported",
        ),
    }
}

async fn handle_post(state: ApiState, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    // The intake middleware replaces multipart bodies with decoded operations.
    if let Some(DecodedOperations(gql)) = parts.extensions.remove::<DecodedOperations>() {
        return execute(state, parts, gql).await;
    }

    if !is_json(&parts) {
        return graphql_error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            "expected application/json or multipart/form-data",
        );
    }

    let limit = state.body_limit as usize;
    let bytes = match body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(error) if is_length_limit(&error) => {
            return graphql_error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("request body exceeds the {limit} byte limit"),
            )
        }
        Err(_) => {
            return graphql_error_response(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "failed to read request body",
            )
        }
    };

    let gql: GraphQLRequest = match serde_json::from_slice(&bytes) {
        Ok(gql) => gql,
        Err(error) => {
            return graphql_error_response(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("request body is not valid JSON: {error}"),
            )
        }
    };
    execute(state, parts, gql).await
}

async fn execute(state: ApiState, parts: Parts, request: GraphQLRequest) -> Response {
    debug!(
        operation = request.operation_name.as_deref().unwrap_or("<anonymous>"),
        uploads = request.uploads.len(),
        "executing operation"
    );
    let ctx = state.context.create(&parts).await;
    let response = state.engine.execute(request, ctx).await;
    Json(response).into_response()
}

fn is_json(parts: &Parts) -> bool {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if inner.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = inner.source();
    }
    false
}
