use crate::dtos::lenient::decimal_or_zero;
use crate::models::{BulkAction, DiscountType, Invoice, InvoiceStatus};
use crate::rendering::DocumentFormat;
use crate::services::calculator::{fits_numeric, Totals};
use crate::services::payments::PaymentKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500, message = "Description is required"))]
    pub description: String,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub rate: Decimal,
}

/// Client created together with the invoice.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewClientRequest {
    #[validate(length(min = 1, max = 255, message = "Client name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid client email"))]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 64, message = "Invalid client phone"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Payload for creating or fully replacing an invoice. Totals are always
/// recomputed from these inputs.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InvoiceRequest {
    pub client_id: Option<Uuid>,
    #[validate(nested)]
    pub new_client: Option<NewClientRequest>,
    #[validate(length(min = 1, max = 64, message = "Invoice number cannot be blank"))]
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[serde(default)]
    pub discount_value: Decimal,
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    /// Omitted on edit keeps the payments already recorded.
    pub amount_paid: Option<Decimal>,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    #[validate(nested)]
    pub line_items: Vec<LineItemRequest>,
}

impl InvoiceRequest {
    /// Field validation plus the numeric bounds derive cannot express.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if self
            .line_items
            .iter()
            .any(|item| item.quantity.is_sign_negative() || item.rate.is_sign_negative())
        {
            errors.add("line_items", bound_error("Quantity and rate cannot be negative"));
        }
        if self
            .line_items
            .iter()
            .any(|item| !fits_numeric(item.quantity, 14, 4) || !fits_numeric(item.rate, 14, 4))
        {
            errors.add(
                "line_items",
                bound_error("Quantity and rate allow 10 digits and 4 decimals"),
            );
        }
        if !fits_numeric(self.discount_value, 14, 4) {
            errors.add("discount_value", bound_error("Discount allows 10 digits and 4 decimals"));
        }
        if self.tax_rate.is_some_and(|rate| !fits_numeric(rate, 7, 3)) {
            errors.add("tax_rate", bound_error("Tax rate allows 4 digits and 3 decimals"));
        }
        if !fits_numeric(self.shipping_cost, 14, 2) {
            errors.add("shipping_cost", bound_error("Shipping allows 12 digits and 2 decimals"));
        }
        if self.amount_paid.is_some_and(|paid| !fits_numeric(paid, 14, 2)) {
            errors.add("amount_paid", bound_error("Amount paid allows 12 digits and 2 decimals"));
        }
        if self.discount_value.is_sign_negative() {
            errors.add("discount_value", bound_error("Discount cannot be negative"));
        }
        if self.discount_type == DiscountType::Percentage
            && self.discount_value > Decimal::ONE_HUNDRED
        {
            errors.add("discount_value", bound_error("Percentage discount cannot exceed 100"));
        }
        if self.tax_rate.is_some_and(|rate| rate.is_sign_negative()) {
            errors.add("tax_rate", bound_error("Tax rate cannot be negative"));
        }
        if self.shipping_cost.is_sign_negative() {
            errors.add("shipping_cost", bound_error("Shipping cannot be negative"));
        }
        if self.amount_paid.is_some_and(|paid| paid.is_sign_negative()) {
            errors.add("amount_paid", bound_error("Amount paid cannot be negative"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub(crate) fn bound_error(message: &'static str) -> ValidationError {
    ValidationError::new("range").with_message(Cow::Borrowed(message))
}

/// Live recalculation input. Every figure is parsed leniently so half-typed
/// values never reject the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub line_items: Vec<PreviewLine>,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub discount_value: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub tax_rate: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub shipping_cost: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub amount_paid: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewLine {
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub rate: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub line_amounts: Vec<Decimal>,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaymentRequest {
    pub amount: Option<Decimal>,
    /// Defaults to `partial` when an amount is given, else `full`.
    pub kind: Option<PaymentKind>,
}

impl PaymentRequest {
    pub fn kind(&self) -> PaymentKind {
        self.kind.unwrap_or(if self.amount.is_some() {
            PaymentKind::Partial
        } else {
            PaymentKind::Full
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateInvoiceResponse {
    pub invoice: Invoice,
    /// Set when the invoice was saved but its document could not be
    /// regenerated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactRequest {
    #[serde(default)]
    pub format: DocumentFormat,
    /// Overrides the account's active template for this render only.
    pub template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub url: String,
    pub format: DocumentFormat,
    pub template: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkRequest {
    #[validate(length(min = 1, max = 500, message = "Select between 1 and 500 invoices"))]
    pub invoice_ids: Vec<Uuid>,
    pub action: BulkAction,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub action: BulkAction,
    pub affected: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListParams {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Invoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}
