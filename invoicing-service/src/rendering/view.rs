//! Read-only view model handed to document templates.
//!
//! All figures are preformatted here so templates only lay out strings.

use crate::models::{BusinessProfile, Client, DiscountType, Invoice, InvoiceStatus, User};
use crate::rendering::renderer::RenderError;
use crate::services::calculator::to_money;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Everything a document is built from. Branches are optional so that
/// missing data is reported before any browser work starts.
#[derive(Debug, Clone)]
pub struct RenderSource {
    pub invoice: Invoice,
    pub client: Option<Client>,
    pub profile: Option<BusinessProfile>,
    pub user: Option<User>,
}

#[derive(Debug, Clone)]
pub struct PartyView {
    pub name: String,
    pub address_lines: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LineView {
    pub description: String,
    pub quantity: String,
    pub rate: String,
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceView {
    pub invoice_number: String,
    pub invoice_date: String,
    pub due_date: Option<String>,
    pub status: String,
    pub is_paid: bool,
    pub notes: Option<String>,
    pub terms: Option<String>,

    pub business: PartyView,
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
    pub client: PartyView,
    pub prepared_by: String,

    pub items: Vec<LineView>,
    pub subtotal: String,
    pub discount_label: String,
    pub discount_amount: Option<String>,
    pub tax_label: String,
    pub tax_amount: Option<String>,
    pub shipping: Option<String>,
    pub total: String,
    pub amount_paid: Option<String>,
    pub balance_due: String,

    pub payment_info: Option<String>,
    pub payment_qr_url: Option<String>,
}

impl InvoiceView {
    /// Assemble the view. Fails on the first missing branch.
    pub fn build(source: &RenderSource) -> Result<Self, RenderError> {
        let client = source
            .client
            .as_ref()
            .ok_or(RenderError::MissingData("client"))?;
        let profile = source
            .profile
            .as_ref()
            .ok_or(RenderError::MissingData("business"))?;
        let user = source.user.as_ref().ok_or(RenderError::MissingData("user"))?;

        let invoice = &source.invoice;
        let business = &profile.business;
        let settings = &profile.settings;
        let money = |amount: Decimal| format_money(amount, &settings.currency);
        let non_zero = |amount: Decimal| (!amount.is_zero()).then(|| money(amount));

        let mut lines: Vec<_> = invoice.line_items.iter().collect();
        lines.sort_by_key(|item| item.sort_order);

        Ok(Self {
            invoice_number: invoice.invoice_number.clone(),
            invoice_date: format_long_date(invoice.invoice_date),
            due_date: invoice.due_date.map(format_long_date),
            status: status_label(invoice.status).to_string(),
            is_paid: invoice.status == InvoiceStatus::Paid,
            notes: non_blank(&invoice.notes),
            terms: non_blank(&invoice.terms),

            business: PartyView {
                name: business.name.clone(),
                address_lines: address_lines(&business.address),
                email: non_blank(&business.email),
                phone: non_blank(&business.phone),
            },
            logo_url: non_blank(&business.logo_url),
            tax_id: non_blank(&business.tax_id),
            client: PartyView {
                name: client.name.clone(),
                address_lines: address_lines(&client.address),
                email: non_blank(&client.email),
                phone: non_blank(&client.phone),
            },
            prepared_by: user.name.clone(),

            items: lines
                .into_iter()
                .map(|item| LineView {
                    description: item.description.clone(),
                    quantity: format_quantity(item.quantity),
                    rate: money(item.rate),
                    amount: money(item.amount),
                })
                .collect(),
            subtotal: money(invoice.subtotal),
            discount_label: discount_label(invoice.discount_type, invoice.discount_value),
            discount_amount: non_zero(invoice.discount_amount),
            tax_label: format!("Tax ({}%)", format_quantity(invoice.tax_rate)),
            tax_amount: non_zero(invoice.tax_amount),
            shipping: non_zero(invoice.shipping_cost),
            total: money(invoice.total),
            amount_paid: non_zero(invoice.amount_paid),
            balance_due: money(invoice.balance_due),

            payment_info: non_blank(&settings.payment_info),
            payment_qr_url: non_blank(&settings.payment_qr_url),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn address_lines(address: &Option<String>) -> Vec<String> {
    address
        .as_deref()
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn status_label(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "Draft",
        InvoiceStatus::Pending => "Pending",
        InvoiceStatus::PartiallyPaid => "Partially Paid",
        InvoiceStatus::Paid => "Paid",
        InvoiceStatus::Overdue => "Overdue",
    }
}

pub fn discount_label(discount_type: DiscountType, value: Decimal) -> String {
    match discount_type {
        DiscountType::Percentage => format!("Discount ({}%)", format_quantity(value)),
        DiscountType::Fixed => "Discount".to_string(),
    }
}

/// `March 5, 2026`
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Quantities and percentages without trailing zeros.
pub fn format_quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "INR" => Some("₹"),
        "JPY" => Some("¥"),
        "AUD" => Some("A$"),
        "CAD" => Some("CA$"),
        "SGD" => Some("S$"),
        _ => None,
    }
}

/// Amount in the business currency, grouped for its locale, two decimals.
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    let fixed = to_money(amount.abs()).to_string();
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let grouped = if code == "INR" {
        group_indian(whole)
    } else {
        group_thousands(whole)
    };

    let sign = if amount.is_sign_negative() && !to_money(amount).is_zero() {
        "-"
    } else {
        ""
    };

    match currency_symbol(&code) {
        Some(symbol) => format!("{}{}{}.{}", sign, symbol, grouped, fraction),
        None => format!("{}{} {}.{}", sign, code, grouped, fraction),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Lakh grouping: last three digits, then pairs (12,34,567).
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut out = String::with_capacity(digits.len() + digits.len() / 2);
    for (i, c) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push(',');
    out.push_str(tail);
    out
}
