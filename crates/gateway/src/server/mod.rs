//! The HTTP pipeline: routing tiers, middleware policy, and assembly.
//!
//! # Responsibilities
//! - Compose the precedence tiers (diagnostics and hook routes, static
//!   assets, the API mount) into one router, first-registered-wins.
//! - Apply the cross-origin policy and request tracing to every response.
//! - Decode multipart uploads ahead of the engine and bound request bodies.

pub mod assemble;
pub mod assets;
pub mod cors;
pub mod diagnostics;
pub mod handlers;
pub mod state;
pub mod uploads;
