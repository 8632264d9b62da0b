//! Shared plumbing for the invoicing workspace.
//!
//! - [`error::AppError`]: the error type every handler returns, with its
//!   HTTP mapping.
//! - [`config::Config`]: listener settings from `configuration` / `APP__*`.
//! - [`observability::init_tracing`]: JSON logs plus optional OTLP export.
//! - [`middleware`]: request ids and response security headers.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
