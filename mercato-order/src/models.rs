use chrono::{DateTime, Utc};
use mercato_catalog::StockLine;
use mercato_core::PaymentStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Processing,
    Confirmed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::ReturnRequested,
        OrderStatus::Returned,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "Processing",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::OutForDelivery => "OutForDelivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::ReturnRequested => "ReturnRequested",
            OrderStatus::Returned => "Returned",
            OrderStatus::Refunded => "Refunded",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Unrecognized order status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    /// Accepts the canonical names in any case, with or without separators
    /// ("out for delivery", "OUT_FOR_DELIVERY", "OutForDelivery").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().to_ascii_lowercase() == key)
            .ok_or_else(|| UnknownStatus(s.trim().to_string()))
    }
}

/// A line of the order; immutable once the order exists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Minor currency units
    pub unit_price: i64,
}

impl OrderItem {
    pub fn new(product_id: Uuid, quantity: i32, unit_price: i64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// `None` when the line does not fit in an `i64`
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Order total exceeds the supported amount")]
pub struct TotalOverflow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnRequest {
    pub requested: bool,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// A customer's purchase and everything the lifecycle has done to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: String,
    pub items: Vec<OrderItem>,
    pub total: i64,
    pub currency: String,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub stock_reduced: bool,
    pub order_locked: bool,
    pub return_request: Option<ReturnRequest>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub tracking: Option<String>,
    pub delivery_notes: Option<String>,
    /// Optimistic concurrency counter, bumped by the store on every save
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        owner_id: impl Into<String>,
        items: Vec<OrderItem>,
        currency: impl Into<String>,
    ) -> Result<Self, TotalOverflow> {
        let now = Utc::now();
        let total = Self::total_of(&items)?;
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            items,
            total,
            currency: currency.into(),
            order_status: OrderStatus::Processing,
            payment_status: PaymentStatus::Pending,
            stock_reduced: false,
            order_locked: false,
            return_request: None,
            delivered_at: None,
            tracking: None,
            delivery_notes: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn total_of(items: &[OrderItem]) -> Result<i64, TotalOverflow> {
        items.iter().try_fold(0i64, |total, item| {
            item.line_total()
                .and_then(|line| total.checked_add(line))
                .ok_or(TotalOverflow)
        })
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn return_requested(&self) -> bool {
        self.return_request.as_ref().is_some_and(|r| r.requested)
    }

    /// Stock lines this order takes out of inventory
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|item| StockLine::new(item.product_id, item.quantity))
            .collect()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
