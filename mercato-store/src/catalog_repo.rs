use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercato_catalog::{Product, StockError, StockLine, StockStore};
use sqlx::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

/// Product stock backed by the `products` table
pub struct PgStockStore {
    pool: PgPool,
}

impl PgStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(e: sqlx::Error) -> StockError {
    error!("Stock query failed: {}", e);
    StockError::Store(e.to_string())
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    unit_price: i64,
    available_quantity: i32,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            unit_price: row.unit_price,
            available_quantity: row.available_quantity,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StockError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, sku, name, unit_price, available_quantity, is_active, updated_at
              FROM products
             WHERE id = $1 AND is_active
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Product::from))
    }

    async fn available(&self, product_id: Uuid) -> Result<Option<i32>, StockError> {
        sqlx::query_scalar("SELECT available_quantity FROM products WHERE id = $1 AND is_active")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)
    }

    /// One transaction of conditional updates. Lines are consolidated and
    /// sorted by product id, so concurrent callers lock rows in the same order.
    async fn decrement_all(&self, lines: &[StockLine]) -> Result<Vec<i32>, StockError> {
        let lines = StockLine::validate_all(lines)?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut remaining = Vec::with_capacity(lines.len());

        for line in &lines {
            let left: Option<i32> = sqlx::query_scalar(
                r#"
                UPDATE products
                   SET available_quantity = available_quantity - $2, updated_at = NOW()
                 WHERE id = $1 AND is_active AND available_quantity >= $2
                RETURNING available_quantity
                "#,
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

            match left {
                Some(left) => remaining.push(left),
                None => {
                    // Dropping the transaction rolls back earlier lines
                    let exists: Option<i32> =
                        sqlx::query_scalar("SELECT available_quantity FROM products WHERE id = $1 AND is_active")
                            .bind(line.product_id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(store_error)?;
                    return Err(match exists {
                        Some(_) => StockError::InsufficientStock(line.product_id),
                        None => StockError::ProductNotFound(line.product_id),
                    });
                }
            }
        }

        tx.commit().await.map_err(store_error)?;
        debug!(lines = lines.len(), "Stock decremented");
        Ok(remaining)
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<(), StockError> {
        let lines = StockLine::validate_all(lines)?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for line in &lines {
            let result = sqlx::query(
                "UPDATE products SET available_quantity = available_quantity + $2, updated_at = NOW() WHERE id = $1",
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StockError::ProductNotFound(line.product_id));
            }
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}
