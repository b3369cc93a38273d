use crate::models::{Order, OrderStatus};
use async_trait::async_trait;
use mercato_core::PaymentStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Administrator listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.order_status == s)
            && self.payment_status.map_or(true, |p| order.payment_status == p)
            && self.owner_id.as_deref().map_or(true, |owner| order.owner_id == owner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order {id} was modified concurrently (expected version {expected})")]
    Conflict { id: Uuid, expected: i64 },

    #[error("Order already exists: {0}")]
    Duplicate(Uuid),

    #[error("Order store failure: {0}")]
    Backend(String),
}

/// Durable order record store with optimistic concurrency.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    /// Persist `order`.
    ///
    /// `expected_version: None` inserts a new record. `Some(v)` updates only if
    /// the stored version is still `v`, otherwise `Conflict`. The returned
    /// order carries the bumped version.
    async fn save(&self, order: &Order, expected_version: Option<i64>) -> Result<Order, RepositoryError>;

    /// Orders of one owner, newest first
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError>;

    async fn find_all(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError>;

    /// Returns false if no such order existed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

pub(crate) fn sort_orders(orders: &mut [Order], sort: SortOrder) {
    match sort {
        SortOrder::NewestFirst => orders.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::OldestFirst => orders.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
}

/// In-memory order store
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &Order, expected_version: Option<i64>) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;

        match expected_version {
            None => {
                if orders.contains_key(&order.id) {
                    return Err(RepositoryError::Duplicate(order.id));
                }
            }
            Some(expected) => {
                let stored = orders
                    .get(&order.id)
                    .map(|o| o.version)
                    .ok_or(RepositoryError::Conflict { id: order.id, expected })?;
                if stored != expected {
                    return Err(RepositoryError::Conflict { id: order.id, expected });
                }
            }
        }

        let mut saved = order.clone();
        saved.version = expected_version.map_or(1, |v| v + 1);
        orders.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let mut found: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.is_owned_by(owner_id))
            .cloned()
            .collect();
        sort_orders(&mut found, SortOrder::NewestFirst);
        Ok(found)
    }

    async fn find_all(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError> {
        let mut found: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        sort_orders(&mut found, query.sort);
        Ok(found)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.orders.write().await.remove(&id).is_some())
    }
}
