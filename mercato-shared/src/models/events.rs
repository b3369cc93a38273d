use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What happened to the order that triggered a notification
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Created,
    Updated,
    PaymentUpdated,
    Cancelled,
    ReturnRequested,
}

/// Payload pushed to realtime observers whenever an order is created or mutated.
///
/// `order` carries the full snapshot as JSON so subscribers never need a
/// follow-up read to render the change.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderChangedEvent {
    pub order_id: Uuid,
    pub owner_id: String,
    pub kind: ChangeKind,
    pub order_status: String,
    pub payment_status: String,
    pub order: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl OrderChangedEvent {
    pub fn event_name(&self) -> &'static str {
        match self.kind {
            ChangeKind::Created => "order:created",
            _ => "order:updated",
        }
    }
}
