//! Error shaping applied to every execution error before serialisation.
//!
//! Outside debug mode the `debug` and `exception` extensions are stripped so
//! internal state never reaches clients. A configured custom formatter runs
//! last and its return value is authoritative; it only ever sees input that
//! has already been redacted for those two keys.

use std::sync::Arc;

use common::GraphQLError;

/// Extensions keys removed outside debug mode.
const REDACTED_KEYS: [&str; 2] = ["debug", "exception"];

/// User-supplied formatter invoked with the redacted error and the original
/// error it was shaped from.
pub type ErrorFormatter =
    Arc<dyn Fn(GraphQLError, &GraphQLError) -> GraphQLError + Send + Sync>;

/// Resolved error-visibility policy for one engine instance.
#[derive(Clone)]
pub struct ErrorFormatPolicy {
    /// Whether debug extensions may reach clients.
    pub debug: bool,
    /// Custom formatter, invoked after built-in redaction.
    pub custom: Option<ErrorFormatter>,
}

impl ErrorFormatPolicy {
    /// A policy with no custom formatter.
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            custom: None,
        }
    }

    /// Shape one error for the response. Total; never fails.
    pub fn format(&self, error: GraphQLError) -> GraphQLError {
        let original = error.clone();
        let mut shaped = error;
        if !self.debug {
            for key in REDACTED_KEYS {
                shaped.extensions.remove(key);
            }
        }
        match &self.custom {
            Some(custom) => custom(shaped, &original),
            None => shaped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_with_internals() -> GraphQLError {
        GraphQLError::new("access denied")
            .with_code("FORBIDDEN")
            .with_extension("debug", json!({"list": "Post"}))
            .with_extension("exception", json!({"stacktrace": ["at resolve"]}))
    }

    #[test]
    fn debug_mode_passes_extensions_through() {
        let policy = ErrorFormatPolicy::new(true);
        let shaped = policy.format(error_with_internals());
        assert!(shaped.extensions.contains_key("debug"));
        assert!(shaped.extensions.contains_key("exception"));
    }

    #[test]
    fn redaction_strips_only_the_two_internal_keys() {
        let policy = ErrorFormatPolicy::new(false);
        let shaped = policy.format(error_with_internals());
        assert!(!shaped.extensions.contains_key("debug"));
        assert!(!shaped.extensions.contains_key("exception"));
        assert_eq!(shaped.extensions["code"], "FORBIDDEN");
        assert_eq!(shaped.message, "access denied");
    }

    #[test]
    fn redaction_handles_errors_without_extensions() {
        let policy = ErrorFormatPolicy::new(false);
        let shaped = policy.format(GraphQLError::new("plain"));
        assert_eq!(shaped, GraphQLError::new("plain"));
    }

    #[test]
    fn custom_formatter_sees_redacted_input() {
        let policy = ErrorFormatPolicy {
            debug: false,
            custom: Some(Arc::new(|shaped, _original| {
                assert!(!shaped.extensions.contains_key("debug"));
                assert!(!shaped.extensions.contains_key("exception"));
                shaped
            })),
        };
        policy.format(error_with_internals());
    }

    #[test]
    fn custom_formatter_receives_the_original_cause() {
        let policy = ErrorFormatPolicy {
            debug: false,
            custom: Some(Arc::new(|shaped, original| {
                assert!(original.extensions.contains_key("exception"));
                shaped
            })),
        };
        policy.format(error_with_internals());
    }

    #[test]
    fn custom_formatter_result_is_authoritative() {
        let policy = ErrorFormatPolicy {
            debug: false,
            custom: Some(Arc::new(|_, _| GraphQLError::new("replaced"))),
        };
        let shaped = policy.format(error_with_internals());
        assert_eq!(shaped.message, "replaced");
        assert!(shaped.extensions.is_empty());
    }
}
