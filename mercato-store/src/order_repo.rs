use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_core::PaymentStatus;
use mercato_order::{
    Order, OrderItem, OrderQuery, OrderRepository, OrderStatus, RepositoryError, ReturnRequest, SortOrder,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, owner_id, total, currency, order_status, payment_status, stock_reduced, \
     order_locked, return_requested, return_reason, return_requested_at, delivered_at, tracking, \
     delivery_notes, version, created_at, updated_at";

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, RepositoryError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT order_id, product_id, quantity, unit_price FROM order_items \
             WHERE order_id = ANY($1) ORDER BY order_id, line_no",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            items
                .entry(row.order_id)
                .or_default()
                .push(OrderItem::new(row.product_id, row.quantity, row.unit_price));
        }
        Ok(items)
    }

    async fn assemble(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }

    async fn insert(&self, order: &Order) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row: OrderRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO orders (id, owner_id, total, currency, order_status, payment_status, stock_reduced,
                                order_locked, return_requested, return_reason, return_requested_at, delivered_at,
                                tracking, delivery_notes, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 1, $15, $16)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.owner_id)
        .bind(order.total)
        .bind(&order.currency)
        .bind(order.order_status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.stock_reduced)
        .bind(order.order_locked)
        .bind(order.return_requested())
        .bind(order.return_request.as_ref().map(|r| r.reason.clone()))
        .bind(order.return_request.as_ref().map(|r| r.requested_at))
        .bind(order.delivered_at)
        .bind(&order.tracking)
        .bind(&order.delivery_notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Duplicate(order.id),
            other => backend(other),
        })?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order.id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        row.into_order(order.items.clone())
    }

    /// Line items never change after insert, only the order row is updated.
    async fn update(&self, order: &Order, expected: i64) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE orders
               SET order_status = $3, payment_status = $4, stock_reduced = $5, order_locked = $6,
                   return_requested = $7, return_reason = $8, return_requested_at = $9, delivered_at = $10,
                   tracking = $11, delivery_notes = $12, updated_at = $13, version = version + 1
             WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(expected)
        .bind(order.order_status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.stock_reduced)
        .bind(order.order_locked)
        .bind(order.return_requested())
        .bind(order.return_request.as_ref().map(|r| r.reason.clone()))
        .bind(order.return_request.as_ref().map(|r| r.requested_at))
        .bind(order.delivered_at)
        .bind(&order.tracking)
        .bind(&order.delivery_notes)
        .bind(order.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => row.into_order(order.items.clone()),
            None => Err(RepositoryError::Conflict { id: order.id, expected }),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    owner_id: String,
    total: i64,
    currency: String,
    order_status: String,
    payment_status: String,
    stock_reduced: bool,
    order_locked: bool,
    return_requested: bool,
    return_reason: Option<String>,
    return_requested_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    tracking: Option<String>,
    delivery_notes: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let order_status = self
            .order_status
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::Backend(format!("order {}: {}", self.id, e)))?;
        let payment_status = self
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| RepositoryError::Backend(format!("order {}: {}", self.id, e)))?;

        let return_request = match (self.return_requested_at, self.return_reason) {
            (Some(requested_at), reason) => Some(ReturnRequest {
                requested: self.return_requested,
                reason: reason.unwrap_or_default(),
                requested_at,
            }),
            (None, _) => None,
        };

        Ok(Order {
            id: self.id,
            owner_id: self.owner_id,
            items,
            total: self.total,
            currency: self.currency,
            order_status,
            payment_status,
            stock_reduced: self.stock_reduced,
            order_locked: self.order_locked,
            return_request,
            delivered_at: self.delivered_at,
            tracking: self.tracking,
            delivery_notes: self.delivery_notes,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: i64,
}

fn backend(e: sqlx::Error) -> RepositoryError {
    error!("Order store query failed: {}", e);
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn load(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save(&self, order: &Order, expected_version: Option<i64>) -> Result<Order, RepositoryError> {
        match expected_version {
            None => self.insert(order).await,
            Some(expected) => self.update(order, expected).await,
        }
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE owner_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        self.assemble(rows).await
    }

    async fn find_all(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM orders WHERE TRUE", ORDER_COLUMNS));

        if let Some(status) = query.status {
            builder.push(" AND order_status = ").push_bind(status.as_str());
        }
        if let Some(payment) = query.payment_status {
            builder.push(" AND payment_status = ").push_bind(payment.as_str());
        }
        if let Some(owner) = &query.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner.clone());
        }
        builder.push(match query.sort {
            SortOrder::NewestFirst => " ORDER BY created_at DESC",
            SortOrder::OldestFirst => " ORDER BY created_at ASC",
        });

        let rows: Vec<OrderRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        self.assemble(rows).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}
