//! The static asset bridge.
//!
//! Mounts one read-only file route per `local` storage entry that carries a
//! serve route. Directory listing, index resolution and redirects are off,
//! and `Last-Modified` is stripped so no modification-time metadata leaks.
//! Routes tagged `file` force `application/octet-stream` on every response
//! regardless of extension, so stored uploads are never content-sniffed;
//! `image` routes keep the detected type.

use std::collections::HashMap;

use axum::http::{header, HeaderValue};
use axum::{http::Response, Router};
use tower::ServiceBuilder;
use tower_http::services::fs::ServeFileSystemResponseBody;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::{AssetKind, StorageConfig, StorageKind};

/// Build the asset tier router with one mount per served storage entry.
///
/// Entries are mounted in name order so startup logs and path resolution are
/// deterministic. Entries that are not `local` or have no serve route are
/// skipped.
pub fn router(storage: &HashMap<String, StorageConfig>) -> Router {
    let mut router = Router::new();

    let mut entries: Vec<_> = storage.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (name, config) in entries {
        if config.kind != StorageKind::Local {
            continue;
        }
        let Some(route) = &config.serve else { continue };

        let kind = route.kind;
        let dir = ServeDir::new(&config.root).append_index_html_on_directories(false);
        let service = ServiceBuilder::new()
            .map_response(move |response: Response<ServeFileSystemResponseBody>| {
                shape_response(response, kind)
            })
            .service(dir);

        router = router.nest_service(&route.path, service);
        info!(storage = %name, path = %route.path, kind = ?kind, "static asset route mounted");
    }

    router
}

fn shape_response(
    mut response: Response<ServeFileSystemResponseBody>,
    kind: AssetKind,
) -> Response<ServeFileSystemResponseBody> {
    if !response.status().is_success() {
        return response;
    }
    response.headers_mut().remove(header::LAST_MODIFIED);
    if kind == AssetKind::File {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    response
}
