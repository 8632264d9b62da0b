//! Payment application against an invoice.

use crate::models::{Invoice, PaymentUpdate};
use crate::services::calculator::to_money;
use crate::services::status::resolve_status;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

/// Whether the payment settles the whole balance or part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Full,
    Partial,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Full => "full",
            PaymentKind::Partial => "partial",
        }
    }
}

/// Result of applying a payment, ready to persist.
#[derive(Debug, Clone, Copy)]
pub struct AppliedPayment {
    pub amount: Decimal,
    pub update: PaymentUpdate,
}

/// Compute the new paid amount, balance and status for a payment.
///
/// A full payment always settles the current balance exactly; a partial one
/// must lie strictly between zero and the balance.
pub fn apply_payment(
    invoice: &Invoice,
    requested_amount: Option<Decimal>,
    kind: PaymentKind,
    today: NaiveDate,
) -> Result<AppliedPayment, AppError> {
    let balance_due = invoice.balance_due;

    let amount = match kind {
        PaymentKind::Full => {
            if balance_due <= Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invoice has no balance due"
                )));
            }
            balance_due
        }
        PaymentKind::Partial => {
            let amount = requested_amount
                .map(to_money)
                .ok_or_else(|| invalid_amount("Payment amount is required".to_string()))?;
            if amount <= Decimal::ZERO || amount >= balance_due {
                return Err(invalid_amount(format!(
                    "Enter an amount greater than 0 and less than balance due ({})",
                    balance_due
                )));
            }
            amount
        }
    };

    let amount_paid = to_money(invoice.amount_paid + amount);
    let new_balance = to_money(invoice.total - amount_paid);
    let status = resolve_status(
        Some(invoice.status),
        amount_paid,
        new_balance,
        invoice.due_date,
        today,
    );

    Ok(AppliedPayment {
        amount,
        update: PaymentUpdate {
            amount_paid,
            balance_due: new_balance,
            status,
            expected_version: invoice.version,
        },
    })
}

fn invalid_amount(message: String) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add(
        "amount",
        ValidationError::new("range").with_message(Cow::Owned(message)),
    );
    AppError::ValidationError(errors)
}
