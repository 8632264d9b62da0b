//! invoicing-service: invoice totals, payment tracking and templated
//! PDF/PNG documents for small businesses.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rendering;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
