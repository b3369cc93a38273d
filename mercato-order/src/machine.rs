use crate::models::{Order, OrderStatus, ReturnRequest};
use chrono::{DateTime, Utc};
use mercato_core::{PaymentError, PaymentStatus, Role};

/// A status change that was applied (or accepted as a no-op)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Validates and applies lifecycle transitions on a single order snapshot.
///
/// Everything here is synchronous and side-effect free beyond the `&mut Order`;
/// stock and persistence are composed on top by the order service.
pub struct StateMachine;

impl StateMachine {
    /// Legal successors of `status` for administrator-driven updates
    pub fn successors(status: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match status {
            Processing => &[Confirmed, Cancelled],
            Confirmed => &[Shipped, Cancelled],
            Shipped => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered],
            Delivered => &[ReturnRequested],
            ReturnRequested => &[Returned, Refunded],
            Cancelled | Returned | Refunded => &[],
        }
    }

    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        Self::successors(from).contains(&to)
    }

    /// Administrator status update.
    ///
    /// Re-sending the current status is accepted as a no-op so callers can
    /// resubmit a full order form; the one exception is `Delivered`, which
    /// reports `AlreadyDelivered`.
    pub fn set_status(
        order: &mut Order,
        requested: OrderStatus,
        actor: Role,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        if actor != Role::Admin {
            return Err(TransitionError::Forbidden);
        }

        let current = order.order_status;

        if current == requested {
            if current == OrderStatus::Delivered {
                return Err(TransitionError::AlreadyDelivered);
            }
            return Ok(Transition { from: current, to: current });
        }

        if current.is_terminal() {
            return Err(TransitionError::Terminal(current));
        }

        if requested == OrderStatus::ReturnRequested {
            return Err(TransitionError::ReturnFlowOnly);
        }

        if !Self::can_transition(current, requested) {
            return Err(TransitionError::InvalidTransition {
                from: current,
                to: requested,
            });
        }

        order.order_status = requested;

        match requested {
            OrderStatus::Delivered => {
                if order.delivered_at.is_none() {
                    order.delivered_at = Some(now);
                }
            }
            OrderStatus::Returned | OrderStatus::Refunded => {
                order.order_locked = true;
            }
            _ => {}
        }

        order.touch(now);
        Ok(Transition {
            from: current,
            to: requested,
        })
    }

    /// Record a (normalized) gateway status on the order.
    pub fn set_payment_status(
        order: &mut Order,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, PaymentError> {
        let status = PaymentStatus::normalize(raw)?;
        if order.payment_status != status {
            order.payment_status = status;
            order.touch(now);
        }
        Ok(status)
    }

    /// Owner-initiated cancellation
    pub fn cancel(order: &mut Order, requesting_user: &str, now: DateTime<Utc>) -> Result<Transition, CancelError> {
        if !order.is_owned_by(requesting_user) {
            return Err(CancelError::Forbidden);
        }

        let current = order.order_status;
        if matches!(
            current,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::ReturnRequested
        ) {
            return Err(CancelError::AlreadyFinal(current));
        }

        if order.order_locked {
            return Err(CancelError::Locked);
        }

        if current.is_terminal() {
            return Err(CancelError::AlreadyFinal(current));
        }

        order.order_status = OrderStatus::Cancelled;
        order.touch(now);
        Ok(Transition {
            from: current,
            to: OrderStatus::Cancelled,
        })
    }

    /// Apply an accepted return request as one transition.
    ///
    /// Callers must have run the eligibility evaluator first.
    pub fn request_return(order: &mut Order, reason: &str, now: DateTime<Utc>) -> Transition {
        let from = order.order_status;
        order.return_request = Some(ReturnRequest {
            requested: true,
            reason: reason.to_string(),
            requested_at: now,
        });
        order.order_status = OrderStatus::ReturnRequested;
        order.order_locked = true;
        order.touch(now);
        Transition {
            from,
            to: OrderStatus::ReturnRequested,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Only administrators may change order status")]
    Forbidden,

    #[error("Order is already delivered")]
    AlreadyDelivered,

    #[error("Order is in terminal status {0}")]
    Terminal(OrderStatus),

    #[error("Returns must be requested by the order owner")]
    ReturnFlowOnly,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CancelError {
    #[error("Only the order owner may cancel")]
    Forbidden,

    #[error("Order can no longer be cancelled (status {0})")]
    AlreadyFinal(OrderStatus),

    #[error("Order is locked")]
    Locked,
}
