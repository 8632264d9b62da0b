//! Domain models for invoicing-service.

mod business;
mod client;
mod invoice;
mod line_item;
mod template;

pub use business::{
    format_invoice_number, Business, BusinessProfile, InvoiceSettings, UpdateSettings, User,
};
pub use client::{Client, CreateClient};
pub use invoice::{
    BulkAction, CreateInvoice, DiscountType, Invoice, InvoiceFinancials, InvoiceStatus,
    ListInvoicesFilter, PaymentUpdate, ReplaceInvoice,
};
pub use line_item::{LineItem, NewLineItem, RateSuggestion};
pub use template::TemplateAssignment;
