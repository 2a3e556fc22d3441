//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dreampos_core::{OrderId, OrderItemId, OrderStatus, ProductId, VariationId};

/// Default page size for order listings.
pub const DEFAULT_ORDER_LIMIT: i64 = 100;

/// Filter for listing orders. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub id: Option<OrderId>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One row of the order listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    /// Major units.
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub currency: String,
}

/// An item line submitted when creating or modifying an order.
///
/// Lines with an `id` update the existing line; lines without one are
/// inserted. Variation selections are always replaced wholesale.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    #[serde(default)]
    pub id: Option<OrderItemId>,
    pub product_id: ProductId,
    pub quantity: i32,
    #[serde(default)]
    pub variations: Vec<VariationId>,
}

/// Body of `POST /api/order` and `PUT /api/order/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderChanges {
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    /// Minor units. Left unchanged when absent.
    #[serde(default)]
    pub tip: Option<Decimal>,
}

/// A chosen variation on an order line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationDetail {
    pub id: VariationId,
    pub name: String,
    /// Minor units.
    pub price_difference: Decimal,
}

/// An order line with its product and variations resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDetail {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    /// Minor units, before variations and discount.
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub variations: Vec<VariationDetail>,
}

/// Contact details and reason attached to a refund request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefundContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub reason: String,
}

/// Amount owed on an order or reservation, straight from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountDue {
    pub cents: i64,
    pub currency: String,
}

/// A line on a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    /// Minor units per unit.
    pub unit_amount: i64,
    pub quantity: i64,
}

impl LineItem {
    /// `unit_amount * quantity`, saturating.
    #[must_use]
    pub const fn subtotal(&self) -> i64 {
        self.unit_amount.saturating_mul(self.quantity)
    }
}
