use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================

/// A customer's purchase record. Items and address are owned by the order
/// and always persisted together with it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub customer_id: Uuid,
    pub items: Vec<Item>,
    pub address: Address,
    pub phone: String,
    pub total_price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order in the `Created` state with a freshly generated id.
    /// The total is derived from the items, never supplied by the caller.
    pub fn new(customer_id: Uuid, items: Vec<Item>, address: Address, phone: impl Into<String>) -> Self {
        let created_at = now();
        let total_price = total_price(&items);

        Self {
            order_id: Uuid::new_v4().to_string(),
            customer_id,
            items,
            address,
            phone: phone.into(),
            total_price,
            status: OrderStatus::Created,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Current time at the microsecond precision Postgres `TIMESTAMPTZ` stores
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Sum of `price * quantity` over the given items.
pub fn total_price(items: &[Item]) -> f64 {
    items
        .iter()
        .map(|item| item.price * f64::from(item.quantity))
        .sum()
}

/// One product line within an order
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Address {
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

/// Inventory record referenced by order items. Not owned by any order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

// ============================================================================
// Order Status
// ============================================================================
//
// Open, string-backed enumeration. Any value is accepted and stored as-is;
// there is no transition table.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Created,
    Updated,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Updated => "updated",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Other(raw) => raw,
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "created" => OrderStatus::Created,
            "updated" => OrderStatus::Updated,
            "paid" => OrderStatus::Paid,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            other => OrderStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        OrderStatus::from(raw.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
