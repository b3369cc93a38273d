use crate::machine::{StateMachine, Transition, TransitionError};
use crate::models::{Order, OrderStatus, UnknownStatus};
use chrono::{DateTime, Utc};
use mercato_core::{PaymentError, PaymentStatus, Role};
use serde::{Deserialize, Serialize};

/// Administrator edit of an order, as submitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminUpdate {
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    pub tracking: Option<String>,
    pub delivery_notes: Option<String>,
}

/// What an applied [`AdminUpdate`] actually changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChange {
    pub transition: Option<Transition>,
    pub payment: Option<PaymentStatus>,
    pub annotated: bool,
}

impl AppliedChange {
    pub fn status_changed(&self) -> bool {
        self.transition.is_some_and(|t| !t.is_noop())
    }

    pub fn only_payment(&self) -> bool {
        self.payment.is_some() && !self.status_changed() && !self.annotated
    }

    /// Nothing on the order moved
    pub fn is_empty(&self) -> bool {
        !self.status_changed() && self.payment.is_none() && !self.annotated
    }
}

/// Handles administrator modifications of an order
pub struct ChangeHandler;

impl ChangeHandler {
    /// Parse every raw field up front so a bad value rejects the whole update
    /// before anything on the order moves.
    pub fn parse(update: &AdminUpdate) -> Result<(Option<OrderStatus>, Option<PaymentStatus>), ChangeError> {
        let status = update
            .order_status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()?;
        let payment = update
            .payment_status
            .as_deref()
            .map(PaymentStatus::normalize)
            .transpose()?;
        Ok((status, payment))
    }

    /// Apply an update: payment first, then status, then annotations.
    pub fn apply(
        order: &mut Order,
        update: &AdminUpdate,
        actor: Role,
        now: DateTime<Utc>,
    ) -> Result<AppliedChange, ChangeError> {
        if actor != Role::Admin {
            return Err(TransitionError::Forbidden.into());
        }

        let (status, payment) = Self::parse(update)?;
        let mut applied = AppliedChange::default();

        if let Some(payment) = payment {
            if order.payment_status != payment {
                order.payment_status = payment;
                order.touch(now);
                applied.payment = Some(payment);
            }
        }

        if let Some(status) = status {
            applied.transition = Some(StateMachine::set_status(order, status, actor, now)?);
        }

        let tracking = Self::merge_annotation(&mut order.tracking, update.tracking.as_deref());
        let notes = Self::merge_annotation(&mut order.delivery_notes, update.delivery_notes.as_deref());
        if tracking || notes {
            applied.annotated = true;
            order.touch(now);
        }

        Ok(applied)
    }

    /// A new non-blank value replaces the old one; blank or missing keeps it.
    /// Returns whether the stored value changed.
    pub fn merge_annotation(current: &mut Option<String>, incoming: Option<&str>) -> bool {
        match incoming.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) if current.as_deref() != Some(value) => {
                *current = Some(value.to_string());
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChangeError {
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use uuid::Uuid;

    fn order() -> Order {
        Order::new("owner", vec![OrderItem::new(Uuid::new_v4(), 1, 900)], "EUR").unwrap()
    }

    #[test]
    fn test_merge_annotation() {
        let mut tracking = Some("TRK-1".to_string());

        assert!(!ChangeHandler::merge_annotation(&mut tracking, None));
        assert!(!ChangeHandler::merge_annotation(&mut tracking, Some("   ")));
        assert_eq!(tracking.as_deref(), Some("TRK-1"));

        assert!(ChangeHandler::merge_annotation(&mut tracking, Some(" TRK-2 ")));
        assert_eq!(tracking.as_deref(), Some("TRK-2"));
    }

    #[test]
    fn test_repeated_values_apply_nothing() {
        let mut order = order();
        order.tracking = Some("TRK-1".to_string());
        let update = AdminUpdate {
            order_status: Some("Processing".to_string()),
            payment_status: Some("pending".to_string()),
            tracking: Some("TRK-1".to_string()),
            delivery_notes: Some("  ".to_string()),
        };

        let applied = ChangeHandler::apply(&mut order, &update, Role::Admin, Utc::now()).unwrap();
        assert!(applied.is_empty());
        assert!(!applied.only_payment());
    }

    #[test]
    fn test_payment_applied_before_status() {
        let mut order = order();
        let update = AdminUpdate {
            order_status: Some("Confirmed".to_string()),
            payment_status: Some("succeeded".to_string()),
            ..Default::default()
        };

        let applied = ChangeHandler::apply(&mut order, &update, Role::Admin, Utc::now()).unwrap();
        assert_eq!(applied.payment, Some(PaymentStatus::Paid));
        assert!(applied.status_changed());
        assert_eq!(order.order_status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_bad_value_rejects_whole_update() {
        let mut order = order();
        let update = AdminUpdate {
            order_status: Some("Teleported".to_string()),
            payment_status: Some("paid".to_string()),
            tracking: Some("TRK-9".to_string()),
            ..Default::default()
        };

        let err = ChangeHandler::apply(&mut order, &update, Role::Admin, Utc::now()).unwrap_err();
        assert!(matches!(err, ChangeError::UnknownStatus(_)));
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.tracking.is_none());
    }

    #[test]
    fn test_annotation_only_update() {
        let mut order = order();
        let update = AdminUpdate {
            delivery_notes: Some("Leave at the door".to_string()),
            ..Default::default()
        };

        let applied = ChangeHandler::apply(&mut order, &update, Role::Admin, Utc::now()).unwrap();
        assert!(applied.annotated);
        assert!(!applied.only_payment());
        assert_eq!(order.delivery_notes.as_deref(), Some("Leave at the door"));
    }

    #[test]
    fn test_customer_cannot_apply() {
        let mut order = order();
        let err = ChangeHandler::apply(&mut order, &AdminUpdate::default(), Role::Customer, Utc::now()).unwrap_err();
        assert_eq!(err, ChangeError::Transition(TransitionError::Forbidden));
    }
}
