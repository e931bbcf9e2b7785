//! Engine option merging.
//!
//! The gateway owns a fixed policy (schema, error formatting, stack-trace
//! inclusion, computed plugin list). Embedders may pass extra options through
//! [`EngineOverrides`]; policy fields always win, everything else the
//! overrides supply is adopted. This keeps precedence auditable instead of
//! burying it in an untyped merge.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use common::SchemaExecutor;

use super::format::{ErrorFormatPolicy, ErrorFormatter};
use super::plugins::EnginePlugin;

/// The options the gateway computes and always controls.
pub struct EnginePolicy {
    /// The compiled schema.
    pub schema: Arc<dyn SchemaExecutor>,
    /// Error-visibility policy.
    pub format: ErrorFormatPolicy,
    /// Whether executor faults carry stack traces in responses.
    pub include_stacktrace: bool,
    /// Plugin list computed from the landing-page selection.
    pub plugins: Vec<Arc<dyn EnginePlugin>>,
}

/// Escape-hatch options supplied by the embedder.
///
/// `schema`, `format_error`, `include_stacktrace` and `plugins` are policy
/// fields: values supplied here are discarded with a warning. `plugins` is
/// the one exception in spirit, since the user list feeds the landing-page
/// computation before the merge rather than being applied raw.
#[derive(Default)]
pub struct EngineOverrides {
    /// Ignored; the schema passed to assembly always wins.
    pub schema: Option<Arc<dyn SchemaExecutor>>,
    /// Ignored; the configured formatter chain always wins.
    pub format_error: Option<ErrorFormatter>,
    /// Ignored; derived from the debug flag.
    pub include_stacktrace: Option<bool>,
    /// Folded into the landing-page computation, not applied raw.
    pub plugins: Option<Vec<Arc<dyn EnginePlugin>>>,
    /// Upper bound on a single execution; adopted as supplied.
    pub execution_timeout: Option<Duration>,
}

/// Fully merged options an [`Engine`](super::Engine) is built from.
pub struct EngineOptions {
    pub schema: Arc<dyn SchemaExecutor>,
    pub format: ErrorFormatPolicy,
    pub include_stacktrace: bool,
    pub plugins: Vec<Arc<dyn EnginePlugin>>,
    pub execution_timeout: Option<Duration>,
}

impl EngineOptions {
    /// Merge the gateway's policy with embedder overrides.
    ///
    /// Policy fields win unconditionally; an override for one is discarded
    /// with a warning. Non-policy fields are adopted from the overrides.
    pub fn merge(policy: EnginePolicy, overrides: EngineOverrides) -> Self {
        if overrides.schema.is_some() {
            warn!("engine override for schema ignored; the assembled schema is authoritative");
        }
        if overrides.format_error.is_some() {
            warn!("engine override for format_error ignored; the configured formatter chain is authoritative");
        }
        if overrides.include_stacktrace.is_some() {
            warn!("engine override for include_stacktrace ignored; derived from the debug flag");
        }

        Self {
            schema: policy.schema,
            format: policy.format,
            include_stacktrace: policy.include_stacktrace,
            plugins: policy.plugins,
            execution_timeout: overrides.execution_timeout,
        }
    }
}
