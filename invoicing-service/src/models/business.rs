//! Business, owner and invoice settings models for invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account holder. Identity is resolved upstream; this is the profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

/// Business details printed on documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
}

/// Per-business invoicing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSettings {
    pub business_id: Uuid,
    pub due_days: i32,
    pub default_tax_rate: Decimal,
    pub currency: String,
    pub invoice_prefix: String,
    /// Next sequence handed out; only ever increases.
    pub next_sequence: i64,
    pub default_notes: Option<String>,
    pub default_terms: Option<String>,
    pub payment_info: Option<String>,
    pub payment_qr_url: Option<String>,
    pub active_template: String,
}

impl InvoiceSettings {
    pub fn format_number(&self, sequence: i64) -> String {
        format_invoice_number(&self.invoice_prefix, sequence)
    }
}

/// `INV-` and 7 give `INV-0007`; sequences past 9999 keep all their digits.
pub fn format_invoice_number(prefix: &str, sequence: i64) -> String {
    format!("{}{:04}", prefix, sequence)
}

/// Business together with its nested settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub business: Business,
    pub settings: InvoiceSettings,
}

/// Input for updating business details and invoice settings.
#[derive(Debug, Clone, Default)]
pub struct UpdateSettings {
    pub name: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
    pub due_days: Option<i32>,
    pub default_tax_rate: Option<Decimal>,
    pub currency: Option<String>,
    pub invoice_prefix: Option<String>,
    pub default_notes: Option<String>,
    pub default_terms: Option<String>,
    pub payment_info: Option<String>,
    pub payment_qr_url: Option<String>,
}
