use crate::changes::{AdminUpdate, AppliedChange, ChangeError, ChangeHandler};
use crate::eligibility::{self, IneligibilityReason, DEFAULT_RETURN_WINDOW_DAYS};
use crate::fanout::FanoutRouter;
use crate::machine::{CancelError, StateMachine, TransitionError};
use crate::models::{Order, OrderStatus};
use crate::repository::{OrderQuery, OrderRepository, RepositoryError};
use crate::stock::{reduction_due, StockLedger};
use chrono::Utc;
use mercato_catalog::{StockError, StockLine};
use mercato_core::{EmailMessage, Identity, Mailer, PaymentEvent, PaymentStatus};
use mercato_shared::{ChangeKind, Masked};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_RETURN_REASON_LEN: usize = 1000;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub return_window: chrono::Duration,
    pub max_save_attempts: u32,
    /// Destination of the return-request alert; `None` disables it
    pub admin_alert_email: Option<String>,
    pub side_effect_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            return_window: chrono::Duration::days(DEFAULT_RETURN_WINDOW_DAYS),
            max_save_attempts: 3,
            admin_alert_email: None,
            side_effect_timeout: Duration::from_millis(2000),
        }
    }
}

/// Checkout payload. Lines are priced from the catalog, never by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub items: Vec<StockLine>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not allowed to access this order")]
    Forbidden,

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order {0} was modified concurrently, retry")]
    Conflict(Uuid),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Transition(TransitionError),

    #[error(transparent)]
    Cancel(CancelError),

    #[error(transparent)]
    Ineligible(#[from] IneligibilityReason),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Forbidden => ServiceError::Forbidden,
            other => ServiceError::Transition(other),
        }
    }
}

impl From<CancelError> for ServiceError {
    fn from(err: CancelError) -> Self {
        match err {
            CancelError::Forbidden => ServiceError::Forbidden,
            other => ServiceError::Cancel(other),
        }
    }
}

impl From<ChangeError> for ServiceError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::UnknownStatus(e) => ServiceError::Validation(e.to_string()),
            ChangeError::Payment(e) => ServiceError::Validation(e.to_string()),
            ChangeError::Transition(e) => e.into(),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { id, .. } => ServiceError::Conflict(id),
            other => ServiceError::Repository(other),
        }
    }
}

/// Orchestrates the order lifecycle: load, authorize, transition, persist,
/// then notify.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    ledger: StockLedger,
    fanout: Arc<FanoutRouter>,
    mailer: Arc<dyn Mailer>,
    settings: ServiceSettings,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        ledger: StockLedger,
        fanout: Arc<FanoutRouter>,
        mailer: Arc<dyn Mailer>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            orders,
            ledger,
            fanout,
            mailer,
            settings,
        }
    }

    pub async fn create_order(&self, identity: &Identity, new_order: NewOrder) -> Result<Order, ServiceError> {
        Self::validate_lines(&new_order.items)?;
        let currency = new_order.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 {
            return Err(ServiceError::Validation(format!("Invalid currency: {}", new_order.currency)));
        }

        self.ledger.check_availability(&new_order.items).await?;
        let items = self.ledger.price_lines(&new_order.items).await?;
        let order = Order::new(identity.user_id.clone(), items, currency)
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let saved = self.orders.save(&order, None).await?;
        info!(order_id = %saved.id, user_id = %saved.owner_id, total = saved.total, "Order created");

        self.fanout.broadcast(&saved, ChangeKind::Created).await;
        Ok(saved)
    }

    pub async fn get_order(&self, identity: &Identity, id: Uuid) -> Result<Order, ServiceError> {
        let order = self.load(id).await?;
        if !identity.can_view(&order.owner_id) {
            return Err(ServiceError::Forbidden);
        }
        Ok(order)
    }

    pub async fn list_own(&self, identity: &Identity) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders.find_by_owner(&identity.user_id).await?)
    }

    pub async fn cancel(&self, identity: &Identity, id: Uuid) -> Result<Order, ServiceError> {
        let (order, _) = self
            .mutate(id, |order| {
                StateMachine::cancel(order, &identity.user_id, Utc::now())?;
                Ok(())
            })
            .await?;

        info!(order_id = %id, user_id = %identity.user_id, "Order cancelled by owner");
        self.fanout.broadcast(&order, ChangeKind::Cancelled).await;
        Ok(order)
    }

    pub async fn request_return(&self, identity: &Identity, id: Uuid, reason: &str) -> Result<Order, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("A return reason is required".to_string()));
        }
        if reason.chars().count() > MAX_RETURN_REASON_LEN {
            return Err(ServiceError::Validation(format!(
                "Return reason exceeds {} characters",
                MAX_RETURN_REASON_LEN
            )));
        }

        let window = self.settings.return_window;
        let (order, _) = self
            .mutate(id, |order| {
                if !order.is_owned_by(&identity.user_id) {
                    return Err(ServiceError::Forbidden);
                }
                let now = Utc::now();
                eligibility::evaluate(order, now, window)?;
                StateMachine::request_return(order, reason, now);
                Ok(())
            })
            .await?;

        info!(order_id = %id, user_id = %identity.user_id, "Return requested");
        self.fanout.broadcast(&order, ChangeKind::ReturnRequested).await;
        self.send_return_alert(&order, reason).await;
        Ok(order)
    }

    pub async fn admin_list(&self, identity: &Identity, query: &OrderQuery) -> Result<Vec<Order>, ServiceError> {
        Self::require_admin(identity)?;
        Ok(self.orders.find_all(query).await?)
    }

    pub async fn admin_update(&self, identity: &Identity, id: Uuid, update: AdminUpdate) -> Result<Order, ServiceError> {
        Self::require_admin(identity)?;
        ChangeHandler::parse(&update)?;

        let role = identity.role;
        let (order, applied) = self
            .mutate(id, |order| Ok(ChangeHandler::apply(order, &update, role, Utc::now())?))
            .await?;

        if applied.is_empty() {
            debug!(order_id = %id, admin = %identity.user_id, "Admin update changed nothing");
            return Ok(order);
        }

        let kind = if applied.transition.is_some_and(|t| t.to == OrderStatus::Cancelled && !t.is_noop()) {
            ChangeKind::Cancelled
        } else if applied.only_payment() {
            ChangeKind::PaymentUpdated
        } else {
            ChangeKind::Updated
        };

        info!(
            order_id = %id,
            admin = %identity.user_id,
            order_status = %order.order_status,
            payment_status = %order.payment_status,
            "Order updated by admin"
        );
        self.fanout.broadcast(&order, kind).await;
        Ok(order)
    }

    /// Record a confirmation from the payment gateway.
    pub async fn apply_payment_event(&self, event: &PaymentEvent) -> Result<Order, ServiceError> {
        PaymentStatus::normalize(&event.status).map_err(|e| ServiceError::Validation(e.to_string()))?;

        let (order, status) = self
            .mutate(event.order_id, |order| {
                StateMachine::set_payment_status(order, &event.status, Utc::now())
                    .map_err(|e| ServiceError::Validation(e.to_string()))
            })
            .await?;

        info!(
            order_id = %order.id,
            payment_status = %status,
            reference = event.reference.as_deref().unwrap_or("-"),
            "Payment event applied"
        );
        self.fanout.broadcast(&order, ChangeKind::PaymentUpdated).await;
        Ok(order)
    }

    /// Unconditional removal; no lifecycle checks and no notification.
    pub async fn admin_delete(&self, identity: &Identity, id: Uuid) -> Result<(), ServiceError> {
        Self::require_admin(identity)?;
        if !self.orders.delete(id).await? {
            return Err(ServiceError::NotFound(id));
        }
        warn!(order_id = %id, admin = %identity.user_id, "Order deleted");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Order, ServiceError> {
        self.orders.load(id).await?.ok_or(ServiceError::NotFound(id))
    }

    /// Load, change, reduce stock if due, then save against the loaded version.
    ///
    /// A lost race restocks whatever this attempt decremented and starts over
    /// from a fresh snapshot. An edit that changed nothing returns the loaded
    /// order without saving.
    async fn mutate<F, R>(&self, id: Uuid, mut apply: F) -> Result<(Order, R), ServiceError>
    where
        F: FnMut(&mut Order) -> Result<R, ServiceError> + Send,
        R: Edit + Send,
    {
        let attempts = self.settings.max_save_attempts.max(1);

        for attempt in 1..=attempts {
            let current = self.load(id).await?;
            let mut next = current.clone();
            let outcome = apply(&mut next)?;
            if !outcome.changed() && !reduction_due(&next) {
                return Ok((current, outcome));
            }

            let receipt = if reduction_due(&next) {
                self.ledger.apply_reduction(&mut next).await?
            } else {
                None
            };

            match self.orders.save(&next, Some(current.version)).await {
                Ok(saved) => return Ok((saved, outcome)),
                Err(e) => {
                    if let Some(receipt) = receipt {
                        if let Err(restock) = self.ledger.revert(receipt).await {
                            error!(order_id = %id, "Stock compensation failed: {}", restock);
                        }
                    }
                    match e {
                        RepositoryError::Conflict { .. } if attempt < attempts => {
                            warn!(order_id = %id, attempt, "Concurrent order update, retrying");
                        }
                        other => {
                            error!(order_id = %id, "Order save failed: {}", other);
                            return Err(other.into());
                        }
                    }
                }
            }
        }

        Err(ServiceError::Conflict(id))
    }

    async fn send_return_alert(&self, order: &Order, reason: &str) {
        let Some(to) = self.settings.admin_alert_email.clone() else {
            return;
        };

        let message = EmailMessage {
            to,
            subject: format!("Return requested for order {}", order.id),
            body: format!(
                "Customer {} requested a return for order {} ({} {}).\n\nReason: {}",
                order.owner_id,
                order.id,
                order.total,
                order.currency,
                reason
            ),
        };
        let recipient = Masked(message.to.clone());

        match tokio::time::timeout(self.settings.side_effect_timeout, self.mailer.send(message)).await {
            Ok(Ok(())) => info!(order_id = %order.id, to = %recipient, "Return alert sent"),
            Ok(Err(e)) => warn!(order_id = %order.id, to = %recipient, "Return alert failed: {}", e),
            Err(_) => warn!(order_id = %order.id, to = %recipient, "Return alert timed out"),
        }
    }

    fn require_admin(identity: &Identity) -> Result<(), ServiceError> {
        if identity.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    }

    fn validate_lines(lines: &[StockLine]) -> Result<(), ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::Validation("An order needs at least one item".to_string()));
        }
        match lines.iter().find(|line| line.quantity <= 0) {
            Some(line) => Err(ServiceError::Validation(format!(
                "Quantity for product {} must be positive",
                line.product_id
            ))),
            None => Ok(()),
        }
    }
}

/// Outcome of an in-place order edit
trait Edit {
    fn changed(&self) -> bool {
        true
    }
}

impl Edit for () {}

impl Edit for PaymentStatus {}

impl Edit for AppliedChange {
    fn changed(&self) -> bool {
        !self.is_empty()
    }
}
