//! The cross-origin access policy layer.
//!
//! Activates only when configured. The boolean `true` form maps to a fixed
//! permissive policy kept for backward compatibility: the request origin is
//! reflected (the wire-compatible way to allow any origin alongside
//! credentials), and methods and request headers are reflected as well. An
//! explicit policy object is applied verbatim. Absent or `false` means no
//! cross-origin headers at all, not a permissive-by-omission default.

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::{CorsPolicy, CorsSetting};

/// Methods allowed when an explicit policy omits its own list.
const DEFAULT_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

/// Errors from translating a configured policy.
#[derive(Debug, Error)]
pub enum CorsError {
    /// An origin is not a valid header value.
    #[error("invalid CORS origin: {0}")]
    InvalidOrigin(String),

    /// A method name is not a valid HTTP method.
    #[error("invalid CORS method: {0}")]
    InvalidMethod(String),

    /// An allowed-header entry is not a valid header name.
    #[error("invalid CORS header name: {0}")]
    InvalidHeader(String),
}

/// Build the CORS layer for the configured setting, or `None` when the
/// policy is disabled.
///
/// # Errors
///
/// Returns [`CorsError`] when an explicit policy contains values that do not
/// parse; surfaces as a failed assembly.
pub fn layer(setting: Option<&CorsSetting>) -> Result<Option<CorsLayer>, CorsError> {
    match setting {
        None | Some(CorsSetting::Flag(false)) => Ok(None),
        Some(CorsSetting::Flag(true)) => Ok(Some(permissive())),
        Some(CorsSetting::Policy(policy)) => from_policy(policy).map(Some),
    }
}

/// The backward-compatible permissive default for `cors = true`.
fn permissive() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn from_policy(policy: &CorsPolicy) -> Result<CorsLayer, CorsError> {
    let origins = policy
        .origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| CorsError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut layer = CorsLayer::new().allow_origin(AllowOrigin::list(origins));

    layer = match &policy.methods {
        Some(methods) => {
            let methods = methods
                .iter()
                .map(|method| {
                    method
                        .parse::<Method>()
                        .map_err(|_| CorsError::InvalidMethod(method.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            layer.allow_methods(AllowMethods::list(methods))
        }
        None => layer.allow_methods(AllowMethods::list(DEFAULT_METHODS)),
    };

    layer = match &policy.allowed_headers {
        Some(headers) => {
            let headers = headers
                .iter()
                .map(|name| {
                    name.parse::<HeaderName>()
                        .map_err(|_| CorsError::InvalidHeader(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            layer.allow_headers(AllowHeaders::list(headers))
        }
        None => layer.allow_headers(AllowHeaders::mirror_request()),
    };

    if policy.credentials {
        layer = layer.allow_credentials(true);
    }
    Ok(layer)
}
