//! Collaborator traits consumed by the gateway.
//!
//! The gateway treats query execution and request-context construction as
//! external concerns: it forwards requests to a [`SchemaExecutor`] and hands
//! it an [`ExecutionContext`] produced by a [`ContextSource`], without ever
//! inspecting either.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::graphql::{GraphQLRequest, GraphQLResponse};

/// Opaque per-request state (identity, database handles, loaders).
///
/// The gateway only forwards this value; executors downcast it to whatever
/// concrete type their [`ContextSource`] produces.
pub type ExecutionContext = Arc<dyn Any + Send + Sync>;

/// An engine-internal failure, as opposed to a resolver error already shaped
/// into the response's `errors` list.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutionFault {
    /// Description of the failure.
    pub message: String,
    /// Captured frames. Surfaced to clients only when the gateway runs with
    /// stack-trace inclusion enabled.
    pub stacktrace: Vec<String>,
}

impl ExecutionFault {
    /// Build a fault with no captured frames.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stacktrace: Vec::new(),
        }
    }
}

/// A compiled GraphQL schema able to execute operations.
///
/// Supplied by an external build step; the gateway never constructs one.
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Execute one operation against the schema.
    ///
    /// Resolver errors belong in the returned response's `errors` list.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionFault`] only for failures of the engine itself;
    /// the gateway converts these into a single shaped response error.
    async fn execute(
        &self,
        request: GraphQLRequest,
        ctx: ExecutionContext,
    ) -> Result<GraphQLResponse, ExecutionFault>;
}

/// Produces [`ExecutionContext`] values for the gateway.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// The assembly-time context handle passed to extension hooks.
    fn shared(&self) -> ExecutionContext;

    /// Build the context for one request from its head.
    async fn create(&self, request: &http::request::Parts) -> ExecutionContext;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_is_the_message() {
        let fault = ExecutionFault::new("resolver registry poisoned");
        assert_eq!(fault.to_string(), "resolver registry poisoned");
        assert!(fault.stacktrace.is_empty());
    }

    #[test]
    fn context_downcasts_to_concrete_type() {
        struct RequestState {
            user: &'static str,
        }
        let ctx: ExecutionContext = Arc::new(RequestState { user: "editor" });
        let state = ctx.downcast_ref::<RequestState>().unwrap();
        assert_eq!(state.user, "editor");
    }
}
