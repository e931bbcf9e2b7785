//! Shared seam types for the content gateway.
//!
//! Schema providers and context builders implement the traits in
//! [`executor`] against the wire types in [`graphql`] without depending on
//! the gateway crate itself.

pub mod executor;
pub mod graphql;
pub mod upload;

pub use executor::{ContextSource, ExecutionContext, ExecutionFault, SchemaExecutor};
pub use graphql::{GraphQLError, GraphQLRequest, GraphQLResponse};
pub use upload::UploadedFile;
