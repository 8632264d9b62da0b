//! Services module for invoicing-service.

pub mod account;
pub mod calculator;
pub mod database;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod publisher;
pub mod repository;
pub mod status;
pub mod storage;

pub use account::AccountService;
pub use database::Database;
pub use invoices::InvoiceService;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use publisher::ArtifactPublisher;
pub use repository::InvoiceRepository;
pub use storage::{LocalStorage, S3Storage, Storage};
