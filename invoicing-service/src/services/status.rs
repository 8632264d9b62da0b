//! Invoice status resolution and the overdue sweep rule.

use crate::models::InvoiceStatus;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Derive the status of an invoice from its requested status and current
/// money position. Rules apply in order; the first match wins.
///
/// A missing due date never makes an invoice overdue, so ambiguous input
/// settles on `Pending`.
pub fn resolve_status(
    requested: Option<InvoiceStatus>,
    amount_paid: Decimal,
    balance_due: Decimal,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> InvoiceStatus {
    if requested == Some(InvoiceStatus::Draft) && amount_paid.is_zero() {
        return InvoiceStatus::Draft;
    }
    if balance_due <= Decimal::ZERO {
        return InvoiceStatus::Paid;
    }
    if amount_paid > Decimal::ZERO {
        return InvoiceStatus::PartiallyPaid;
    }
    match due_date {
        Some(due) if due < today => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Pending,
    }
}

/// Whether the sweep should flip this invoice to `Overdue`. Only pending
/// invoices past their due date qualify.
pub fn is_overdue_candidate(
    status: InvoiceStatus,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    status == InvoiceStatus::Pending && due_date.is_some_and(|due| due < today)
}
