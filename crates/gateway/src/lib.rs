//! HTTP bootstrap for the content-management backend.
//!
//! # Responsibilities
//! - Assemble a single listener serving the GraphQL API plus its auxiliary
//!   concerns: CORS, the deprecated health-check route, static delivery of
//!   locally stored assets, and multipart upload intake.
//! - Enforce the pipeline's fixed registration order and its information-leak
//!   policy for error responses.
//! - Hand the bound listener, the composed router, and the started engine
//!   back to the process bootstrap, which owns their lifecycle.
//!
//! Query execution and request-context construction stay behind the
//! [`common::SchemaExecutor`] and [`common::ContextSource`] seams.

pub mod config;
pub mod engine;
pub mod server;
pub mod telemetry;

pub use config::{Environment, GatewayConfig};
pub use engine::Engine;
pub use server::assemble::{assemble, AssembleError, AssembledServer};
