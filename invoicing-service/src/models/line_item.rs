//! Line item model for invoicing-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line item on an invoice. `amount` is always `quantity × rate` rounded to
/// minor units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
}

/// Line item ready to be written, with its amount already derived.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub line_item_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
}

impl From<NewLineItem> for LineItem {
    fn from(item: NewLineItem) -> Self {
        Self {
            line_item_id: item.line_item_id,
            description: item.description,
            quantity: item.quantity,
            rate: item.rate,
            amount: item.amount,
            sort_order: item.sort_order,
        }
    }
}

/// A previously billed description and the rate it was billed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSuggestion {
    pub description: String,
    pub rate: Decimal,
}
