//! HTTP handlers for invoicing-service.

pub mod account;
pub mod health;
pub mod invoices;

pub use account::*;
pub use health::*;
pub use invoices::*;
