//! Order entity and line items

use super::status::OrderStatus;
use crate::error::OrderError;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Backend-assigned order identifier
pub type OrderId = i64;

/// Maximum allowed unit price (€1,000,000)
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line
const MAX_QUANTITY: u32 = 9999;

/// One dish on an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub dish_id: i64,
    pub dish_name: String,
    /// Always >= 1
    pub quantity: u32,
    pub unit_price: f64,
}

impl OrderLine {
    pub fn new(dish_id: i64, dish_name: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            dish_id,
            dish_name: dish_name.into(),
            quantity,
            unit_price,
        }
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if self.dish_name.trim().is_empty() {
            return Err(OrderError::InvalidLine(format!(
                "dish {} has an empty name",
                self.dish_id
            )));
        }
        if self.quantity == 0 || self.quantity > MAX_QUANTITY {
            return Err(OrderError::InvalidLine(format!(
                "quantity for {} must be between 1 and {}, got {}",
                self.dish_name, MAX_QUANTITY, self.quantity
            )));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 || self.unit_price > MAX_PRICE {
            return Err(OrderError::InvalidLine(format!(
                "unit price for {} must be between 0 and {}, got {}",
                self.dish_name, MAX_PRICE, self.unit_price
            )));
        }
        Ok(())
    }

    /// quantity * unit_price, exact to the cent
    pub fn subtotal(&self) -> Decimal {
        to_decimal(self.unit_price) * Decimal::from(self.quantity)
    }
}

/// Order as served by the backend
///
/// Treated as an immutable value: status changes produce a new `Order`
/// through [`Order::with_status`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// None for takeaway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<i32>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    /// Unix milliseconds
    pub created_at: i64,
    /// Backend total; wins over the locally computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// Unix milliseconds of the last backend-side change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Order {
    /// Return a copy moved to `next`, or `InvalidTransition`.
    pub fn with_status(&self, next: OrderStatus) -> Result<Order, OrderError> {
        self.status.validate_transition(next)?;
        Ok(Order {
            status: next,
            ..self.clone()
        })
    }

    /// Sum of line subtotals rounded to two decimals.
    ///
    /// Display fallback only; see [`Order::total`].
    pub fn computed_total(&self) -> f64 {
        let sum: Decimal = self.lines.iter().map(OrderLine::subtotal).sum();
        sum.round_dp(2).to_f64().unwrap_or_default()
    }

    /// Backend total if present, otherwise the computed one
    pub fn total(&self) -> f64 {
        self.total_amount.unwrap_or_else(|| self.computed_total())
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_takeaway(&self) -> bool {
        self.table_number.is_none()
    }
}

/// Order creation payload (POS)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<i32>,
    pub lines: Vec<OrderLine>,
}

impl NewOrder {
    pub fn for_table(table_number: i32) -> Self {
        Self {
            table_number: Some(table_number),
            lines: Vec::new(),
        }
    }

    pub fn takeaway() -> Self {
        Self {
            table_number: None,
            lines: Vec::new(),
        }
    }

    pub fn with_line(mut self, line: OrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::InvalidLine("order has no lines".to_string()));
        }
        self.lines.iter().try_for_each(OrderLine::validate)
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}
