//! Shared state injected into the API tier's handlers and middleware.

use std::sync::Arc;

use common::ContextSource;

use crate::engine::Engine;

/// State shared by the API mount's handlers.
///
/// All fields are cheaply cloneable so axum can clone the state per request.
#[derive(Clone)]
pub struct ApiState {
    /// The started execution engine.
    pub engine: Arc<Engine>,
    /// Builds per-request execution contexts.
    pub context: Arc<dyn ContextSource>,
    /// Per-file upload ceiling in bytes.
    pub max_file_size: u64,
    /// JSON body limit in bytes.
    pub body_limit: u64,
}
