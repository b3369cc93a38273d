use crate::models::{Order, OrderStatus};
use chrono::{DateTime, Duration, Utc};
use mercato_core::PaymentStatus;

pub const DEFAULT_RETURN_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum IneligibilityReason {
    #[error("A return has already been requested for this order")]
    AlreadyRequested,

    #[error("Order is still being processed")]
    TooEarly,

    #[error("Order has already been refunded")]
    AlreadyRefunded,

    #[error("Order has not been delivered")]
    NotDelivered,

    #[error("Return window has expired")]
    WindowExpired,

    #[error("Order is locked")]
    Locked,
}

/// Decide whether `order` may enter the return flow at `now`.
///
/// Checks run in a fixed order and the first failure is reported.
pub fn evaluate(order: &Order, now: DateTime<Utc>, window: Duration) -> Result<(), IneligibilityReason> {
    if order.return_requested()
        || matches!(order.order_status, OrderStatus::ReturnRequested | OrderStatus::Returned)
    {
        return Err(IneligibilityReason::AlreadyRequested);
    }

    if order.order_status == OrderStatus::Processing {
        return Err(IneligibilityReason::TooEarly);
    }

    if order.payment_status == PaymentStatus::Refunded {
        return Err(IneligibilityReason::AlreadyRefunded);
    }

    let delivered_at = match (order.order_status, order.delivered_at) {
        (OrderStatus::Delivered, Some(at)) => at,
        _ => return Err(IneligibilityReason::NotDelivered),
    };

    if now > delivered_at + window {
        return Err(IneligibilityReason::WindowExpired);
    }

    if order.order_locked {
        return Err(IneligibilityReason::Locked);
    }

    Ok(())
}
