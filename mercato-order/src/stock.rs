use crate::models::{Order, OrderItem, OrderStatus};
use mercato_catalog::{StockError, StockLine, StockStore};
use mercato_core::PaymentStatus;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether the order has crossed into a committed state and still owes its
/// stock reduction.
///
/// Condition based: a paid order and an order confirmed/shipped/delivered both
/// qualify, so paid-then-shipped and confirmed-then-paid-on-delivery flows are
/// covered alike. Cancelled orders never reduce.
pub fn reduction_due(order: &Order) -> bool {
    if order.stock_reduced || order.order_status == OrderStatus::Cancelled {
        return false;
    }

    order.payment_status == PaymentStatus::Paid
        || matches!(
            order.order_status,
            OrderStatus::Confirmed | OrderStatus::Shipped | OrderStatus::OutForDelivery | OrderStatus::Delivered
        )
}

/// Proof of a reduction that has hit the store but not yet been persisted on
/// the order. Hand it back to [`StockLedger::revert`] if the save fails.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct StockReceipt {
    pub lines: Vec<StockLine>,
}

/// Applies and guards the one-time stock decrement of an order
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn StockStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    /// Decrement stock for every line of `order`, or for none of them.
    ///
    /// Idempotent: an order whose stock is already reduced returns `Ok(None)`
    /// without touching the store.
    pub async fn apply_reduction(&self, order: &mut Order) -> Result<Option<StockReceipt>, StockError> {
        if order.stock_reduced {
            return Ok(None);
        }

        let lines = order.stock_lines();
        StockLine::validate_all(&lines)?;

        self.store.decrement_all(&lines).await?;
        order.stock_reduced = true;

        info!(order_id = %order.id, lines = lines.len(), "Stock reduced for order");
        Ok(Some(StockReceipt { lines }))
    }

    /// Compensate a reduction whose order update never got persisted.
    pub async fn revert(&self, receipt: StockReceipt) -> Result<(), StockError> {
        self.store.restock(&receipt.lines).await.map_err(|e| {
            warn!("Failed to restock {} lines after aborted update: {}", receipt.lines.len(), e);
            e
        })
    }

    /// Check that stock currently covers `lines` without reserving anything.
    pub async fn check_availability(&self, lines: &[StockLine]) -> Result<(), StockError> {
        for line in StockLine::validate_all(lines)? {
            let available = self
                .store
                .available(line.product_id)
                .await?
                .ok_or(StockError::ProductNotFound(line.product_id))?;
            if available < line.quantity {
                return Err(StockError::InsufficientStock(line.product_id));
            }
        }
        Ok(())
    }

    /// Price each requested line at the catalog's current unit price.
    pub async fn price_lines(&self, lines: &[StockLine]) -> Result<Vec<OrderItem>, StockError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .store
                .product(line.product_id)
                .await?
                .ok_or(StockError::ProductNotFound(line.product_id))?;
            items.push(OrderItem::new(line.product_id, line.quantity, product.unit_price));
        }
        Ok(items)
    }
}
