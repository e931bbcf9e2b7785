//! The execution-engine wrapper.
//!
//! # Responsibilities
//! - Hold the merged engine options and the opaque schema executor.
//! - Gate execution behind an explicit, fallible readiness step; the
//!   assembler registers the API route only after [`Engine::start`] resolves.
//! - Convert executor faults into shaped response errors and run every error
//!   through the formatting pipeline.

pub mod format;
pub mod options;
pub mod plugins;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use common::{
    ExecutionContext, ExecutionFault, GraphQLError, GraphQLRequest, GraphQLResponse,
    SchemaExecutor,
};

use self::format::ErrorFormatPolicy;
use self::options::EngineOptions;
use self::plugins::EnginePlugin;

/// Errors from the engine's lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A plugin's readiness hook failed.
    #[error("engine plugin failed to start")]
    PluginStart(#[source] anyhow::Error),
}

/// The long-lived query engine instance.
///
/// Safe for concurrent use: execution only reads the immutable options and
/// the started flag.
pub struct Engine {
    schema: Arc<dyn SchemaExecutor>,
    format: ErrorFormatPolicy,
    include_stacktrace: bool,
    plugins: Vec<Arc<dyn EnginePlugin>>,
    execution_timeout: Option<Duration>,
    started: AtomicBool,
}

impl Engine {
    /// Build an engine from fully merged options.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            schema: options.schema,
            format: options.format,
            include_stacktrace: options.include_stacktrace,
            plugins: options.plugins,
            execution_timeout: options.execution_timeout,
            started: AtomicBool::new(false),
        }
    }

    /// The opaque schema this engine executes against.
    pub fn schema(&self) -> &Arc<dyn SchemaExecutor> {
        &self.schema
    }

    /// Run every plugin's readiness hook, in order, then mark the engine
    /// ready. Must resolve before the API route is registered.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PluginStart`] on the first hook failure; the
    /// engine stays unstarted.
    pub async fn start(&self) -> Result<(), EngineError> {
        for plugin in &self.plugins {
            plugin.on_start().await.map_err(EngineError::PluginStart)?;
        }
        self.started.store(true, Ordering::Release);
        debug!(plugins = self.plugins.len(), "engine started");
        Ok(())
    }

    /// Execute one operation and shape every resulting error.
    ///
    /// Never fails: executor faults and timeouts become response errors.
    pub async fn execute(
        &self,
        request: GraphQLRequest,
        ctx: ExecutionContext,
    ) -> GraphQLResponse {
        if !self.started.load(Ordering::Acquire) {
            warn!("execution attempted before engine start");
            return GraphQLResponse::from_error(self.shape_error(
                GraphQLError::new("the execution engine has not been started")
                    .with_code("INTERNAL_SERVER_ERROR"),
            ));
        }

        let execution = self.schema.execute(request, ctx);
        let result = match self.execution_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionFault::new(format!(
                    "execution exceeded the {}ms limit",
                    limit.as_millis()
                ))),
            },
            None => execution.await,
        };

        let mut response = match result {
            Ok(response) => response,
            Err(fault) => {
                warn!(error = %fault, "executor fault");
                GraphQLResponse::from_error(self.fault_error(fault))
            }
        };

        response.errors = response
            .errors
            .into_iter()
            .map(|error| self.shape_error(error))
            .collect();
        response
    }

    /// The landing page served to browser requests, from the first plugin
    /// that supplies one.
    pub fn landing_page(&self) -> Option<String> {
        self.plugins.iter().find_map(|plugin| plugin.landing_page())
    }

    /// Convert an executor fault into a response error. The `exception`
    /// extension carries frames only under the stack-trace policy; redaction
    /// may still strip the whole extension afterwards.
    fn fault_error(&self, fault: ExecutionFault) -> GraphQLError {
        let mut exception = serde_json::Map::new();
        exception.insert("message".into(), Value::String(fault.message.clone()));
        if self.include_stacktrace {
            exception.insert("stacktrace".into(), json!(fault.stacktrace));
        }
        GraphQLError::new(fault.message)
            .with_code("INTERNAL_SERVER_ERROR")
            .with_extension("exception", Value::Object(exception))
    }

    /// Apply the stack-trace policy, then the formatting pipeline.
    fn shape_error(&self, mut error: GraphQLError) -> GraphQLError {
        if !self.include_stacktrace {
            if let Some(Value::Object(exception)) = error.extensions.get_mut("exception") {
                exception.remove("stacktrace");
            }
        }
        self.format.format(error)
    }
}
