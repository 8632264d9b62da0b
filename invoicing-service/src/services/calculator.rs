//! Invoice totals derivation.
//!
//! Every derived figure is recomputed from raw inputs on each call; nothing is
//! accumulated. The same function backs the advisory preview endpoint and the
//! authoritative recomputation performed before any invoice is persisted.

use crate::models::DiscountType;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

/// Minor-unit precision for all monetary amounts.
pub const CURRENCY_SCALE: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Quantity and rate of a single line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineInput {
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// Raw inputs to the calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalsInput {
    pub items: Vec<LineInput>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub tax_rate: Decimal,
    pub shipping_cost: Decimal,
    pub amount_paid: Decimal,
}

/// Derived totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub balance_due: Decimal,
}

/// Round half away from zero to minor units and pin the scale so amounts
/// always serialize with two decimals.
pub fn to_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Raised when an intermediate amount leaves the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Amounts are too large to calculate")]
pub struct AmountOverflow;

impl From<AmountOverflow> for AppError {
    fn from(err: AmountOverflow) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(
            "line_items",
            ValidationError::new("range").with_message(Cow::Owned(err.to_string())),
        );
        AppError::ValidationError(errors)
    }
}

/// Whether `value` fits a `NUMERIC(precision, scale)` column without
/// rounding. Trailing zeros beyond `scale` are ignored.
pub fn fits_numeric(value: Decimal, precision: u32, scale: u32) -> bool {
    let integer_digits = precision.saturating_sub(scale);
    let limit = Decimal::from(10u64.pow(integer_digits));
    value.normalize().scale() <= scale && value.abs() < limit
}

/// Amount of one line, rounded independently of the others.
pub fn line_amount(quantity: Decimal, rate: Decimal) -> Result<Decimal, AmountOverflow> {
    quantity
        .checked_mul(rate)
        .map(to_money)
        .ok_or(AmountOverflow)
}

fn percent_of(amount: Decimal, percent: Decimal) -> Result<Decimal, AmountOverflow> {
    amount
        .checked_mul(percent)
        .and_then(|v| v.checked_div(HUNDRED))
        .map(to_money)
        .ok_or(AmountOverflow)
}

pub fn compute_totals(input: &TotalsInput) -> Result<Totals, AmountOverflow> {
    let mut sum = Decimal::ZERO;
    for item in &input.items {
        sum = sum
            .checked_add(line_amount(item.quantity, item.rate)?)
            .ok_or(AmountOverflow)?;
    }
    let subtotal = to_money(sum);

    let requested_discount = match input.discount_type {
        DiscountType::Percentage => percent_of(subtotal, input.discount_value)?,
        DiscountType::Fixed => to_money(input.discount_value),
    };
    // A discount never takes the taxable amount below zero.
    let discount_amount = requested_discount.min(subtotal);

    let taxable_amount = subtotal - discount_amount;
    let tax_amount = percent_of(taxable_amount, input.tax_rate)?;
    let total = taxable_amount
        .checked_add(tax_amount)
        .and_then(|v| v.checked_add(input.shipping_cost))
        .map(to_money)
        .ok_or(AmountOverflow)?;
    let balance_due = total
        .checked_sub(input.amount_paid)
        .map(to_money)
        .ok_or(AmountOverflow)?;

    Ok(Totals {
        subtotal,
        discount_amount,
        taxable_amount: to_money(taxable_amount),
        tax_amount,
        total,
        balance_due,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(items: &[(Decimal, Decimal)]) -> TotalsInput {
        TotalsInput {
            items: items
                .iter()
                .map(|(quantity, rate)| LineInput {
                    quantity: *quantity,
                    rate: *rate,
                })
                .collect(),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
        }
    }

    #[test]
    fn worked_example_with_percentage_discount_tax_and_shipping() {
        let mut request = input(&[(dec!(2), dec!(50))]);
        request.discount_value = dec!(10);
        request.tax_rate = dec!(10);
        request.shipping_cost = dec!(5);

        let totals = compute_totals(&request).unwrap();

        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.discount_amount, dec!(10));
        assert_eq!(totals.taxable_amount, dec!(90));
        assert_eq!(totals.tax_amount, dec!(9));
        assert_eq!(totals.total, dec!(104));
        assert_eq!(totals.balance_due, dec!(104));
        assert_eq!(totals.total.to_string(), "104.00");
    }

    #[test]
    fn subtotal_is_independent_of_item_order() {
        let forward = input(&[(dec!(3), dec!(19.99)), (dec!(1.5), dec!(8)), (dec!(7), dec!(0.33))]);
        let mut reversed = forward.clone();
        reversed.items.reverse();

        assert_eq!(
            compute_totals(&forward).unwrap().subtotal,
            compute_totals(&reversed).unwrap().subtotal
        );
        assert_eq!(compute_totals(&forward).unwrap().subtotal, dec!(74.28));
    }

    #[test]
    fn each_line_is_rounded_before_summing() {
        // 0.333 * 1 rounds to 0.33 on each line, so three lines give 0.99.
        let request = input(&[(dec!(1), dec!(0.333)), (dec!(1), dec!(0.333)), (dec!(1), dec!(0.333))]);
        assert_eq!(compute_totals(&request).unwrap().subtotal, dec!(0.99));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let mut request = input(&[(dec!(1), dec!(40))]);
        request.discount_type = DiscountType::Fixed;
        request.discount_value = dec!(75);
        request.shipping_cost = dec!(5);

        let totals = compute_totals(&request).unwrap();

        assert_eq!(totals.discount_amount, totals.subtotal);
        assert_eq!(totals.taxable_amount, Decimal::ZERO);
        assert_eq!(totals.total, dec!(5));
    }

    #[test]
    fn total_matches_closed_form_with_zero_adjustments() {
        let request = input(&[(dec!(4), dec!(12.5))]);
        let totals = compute_totals(&request).unwrap();
        assert_eq!(totals.total, dec!(50));
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.discount_amount, Decimal::ZERO);
    }

    #[test]
    fn total_matches_closed_form_formula() {
        let mut request = input(&[(dec!(3), dec!(20)), (dec!(2), dec!(15))]);
        request.discount_type = DiscountType::Fixed;
        request.discount_value = dec!(10);
        request.tax_rate = dec!(5);
        request.shipping_cost = dec!(7.5);

        let totals = compute_totals(&request).unwrap();
        let expected = (totals.subtotal - totals.discount_amount)
            * (Decimal::ONE + request.tax_rate / Decimal::ONE_HUNDRED)
            + request.shipping_cost;

        assert_eq!(totals.total, expected);
        assert_eq!(totals.total, dec!(91.5));
    }

    #[test]
    fn overpayment_produces_negative_balance() {
        let mut request = input(&[(dec!(1), dec!(100))]);
        request.amount_paid = dec!(120);

        let totals = compute_totals(&request).unwrap();

        assert_eq!(totals.balance_due, dec!(-20));
    }

    #[test]
    fn recomputing_is_idempotent() {
        let mut request = input(&[(dec!(2.5), dec!(33.33)), (dec!(1), dec!(9.99))]);
        request.discount_value = dec!(12.5);
        request.tax_rate = dec!(8.25);
        request.shipping_cost = dec!(3);
        request.amount_paid = dec!(10);

        assert_eq!(compute_totals(&request).unwrap(), compute_totals(&request).unwrap());
    }

    #[test]
    fn fits_numeric_follows_column_shape() {
        assert!(fits_numeric(dec!(9999999999.9999), 14, 4));
        assert!(!fits_numeric(dec!(10000000000), 14, 4));
        assert!(!fits_numeric(dec!(1.00001), 14, 4));
        assert!(fits_numeric(dec!(1.50000), 14, 2));
        assert!(fits_numeric(dec!(-999.999), 7, 3));
        assert!(!fits_numeric(dec!(-10000), 7, 3));
    }

    #[test]
    fn oversized_amounts_are_reported_not_panicking() {
        let request = input(&[(dec!(100000000000000000000), dec!(100000000000000000000))]);
        assert_eq!(compute_totals(&request), Err(AmountOverflow));

        let mut request = input(&[(Decimal::MAX, Decimal::ONE), (Decimal::MAX, Decimal::ONE)]);
        assert_eq!(compute_totals(&request), Err(AmountOverflow));

        request.items.truncate(1);
        request.items[0].quantity = dec!(10000000000000000000000000);
        request.discount_value = dec!(100000);
        assert_eq!(compute_totals(&request), Err(AmountOverflow));
    }
}
