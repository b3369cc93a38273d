use crate::product::{Product, StockLine};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StockError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Stock store failure: {0}")]
    Store(String),
}

/// Product stock as seen by the order backend.
///
/// Every decrement is conditional: a store must never let `available_quantity`
/// go below zero, even under concurrent callers. Inactive products behave as
/// unknown ones.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Active product by id, used to price order lines.
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StockError>;

    /// Current available quantity, `None` if the product is unknown.
    async fn available(&self, product_id: Uuid) -> Result<Option<i32>, StockError>;

    /// Decrement one product only if enough stock remains. Returns the new quantity.
    async fn conditional_decrement(&self, product_id: Uuid, quantity: i32) -> Result<i32, StockError> {
        let remaining = self.decrement_all(&[StockLine::new(product_id, quantity)]).await?;
        remaining
            .first()
            .copied()
            .ok_or_else(|| StockError::Store("empty decrement result".to_string()))
    }

    /// Decrement every line or none of them.
    ///
    /// Returns the remaining quantity per consolidated line, ordered by product id.
    async fn decrement_all(&self, lines: &[StockLine]) -> Result<Vec<i32>, StockError>;

    /// Put quantities back, used to compensate a reduction that was never recorded.
    async fn restock(&self, lines: &[StockLine]) -> Result<(), StockError>;
}

/// In-memory product catalog and stock.
///
/// Check and apply happen under one lock, which gives the same all-or-nothing
/// guarantee as the conditional `UPDATE` used by the Postgres store.
pub struct InventoryManager {
    products: Mutex<HashMap<Uuid, Product>>,
}

impl InventoryManager {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
        }
    }

    /// Set the available quantity of a product, adding a bare entry if it is unknown
    pub fn initialize(&self, product_id: Uuid, available_quantity: i32) {
        self.products
            .lock()
            .entry(product_id)
            .and_modify(|product| product.available_quantity = available_quantity)
            .or_insert_with(|| Product::stocked(product_id, available_quantity));
    }

    pub fn register(&self, product: Product) {
        self.products.lock().insert(product.id, product);
    }

    pub fn get(&self, product_id: &Uuid) -> Option<Product> {
        self.products.lock().get(product_id).cloned()
    }
}

impl Default for InventoryManager {
    fn default() -> Self {
        Self::new()
    }
}

fn active<'a>(products: &'a mut HashMap<Uuid, Product>, product_id: &Uuid) -> Option<&'a mut Product> {
    products.get_mut(product_id).filter(|product| product.is_active)
}

#[async_trait]
impl StockStore for InventoryManager {
    async fn product(&self, product_id: Uuid) -> Result<Option<Product>, StockError> {
        Ok(self.get(&product_id).filter(|product| product.is_active))
    }

    async fn available(&self, product_id: Uuid) -> Result<Option<i32>, StockError> {
        Ok(self.product(product_id).await?.map(|product| product.available_quantity))
    }

    async fn decrement_all(&self, lines: &[StockLine]) -> Result<Vec<i32>, StockError> {
        let lines = StockLine::validate_all(lines)?;
        let mut products = self.products.lock();

        for line in &lines {
            let product = active(&mut products, &line.product_id).ok_or(StockError::ProductNotFound(line.product_id))?;
            if product.available_quantity < line.quantity {
                return Err(StockError::InsufficientStock(line.product_id));
            }
        }

        let mut remaining = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Some(product) = active(&mut products, &line.product_id) {
                product.available_quantity -= line.quantity;
                remaining.push(product.available_quantity);
            }
        }
        Ok(remaining)
    }

    async fn restock(&self, lines: &[StockLine]) -> Result<(), StockError> {
        let lines = StockLine::validate_all(lines)?;
        let mut products = self.products.lock();

        let mut restocked = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = products
                .get(&line.product_id)
                .ok_or(StockError::ProductNotFound(line.product_id))?;
            let quantity = product
                .available_quantity
                .checked_add(line.quantity)
                .ok_or(StockError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })?;
            restocked.push((line.product_id, quantity));
        }

        for (product_id, quantity) in restocked {
            if let Some(product) = products.get_mut(&product_id) {
                product.available_quantity = quantity;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_inventory_lifecycle() {
        let manager = InventoryManager::new();
        let product_id = Uuid::new_v4();

        manager.initialize(product_id, 10);
        assert_eq!(manager.available(product_id).await.unwrap(), Some(10));

        let left = manager.conditional_decrement(product_id, 4).await.unwrap();
        assert_eq!(left, 6);

        manager.restock(&[StockLine::new(product_id, 4)]).await.unwrap();
        assert_eq!(manager.get(&product_id).unwrap().available_quantity, 10);
    }

    #[tokio::test]
    async fn test_decrement_is_all_or_nothing() {
        let manager = InventoryManager::new();
        let plenty = Uuid::new_v4();
        let scarce = Uuid::new_v4();
        manager.initialize(plenty, 50);
        manager.initialize(scarce, 1);

        let err = manager
            .decrement_all(&[StockLine::new(plenty, 5), StockLine::new(scarce, 2)])
            .await
            .unwrap_err();

        assert_eq!(err, StockError::InsufficientStock(scarce));
        assert_eq!(manager.get(&plenty).unwrap().available_quantity, 50);
        assert_eq!(manager.get(&scarce).unwrap().available_quantity, 1);
    }

    #[tokio::test]
    async fn test_duplicate_lines_checked_as_one() {
        let manager = InventoryManager::new();
        let product_id = Uuid::new_v4();
        manager.initialize(product_id, 3);

        // 2 + 2 exceeds 3 even though each line alone fits
        let err = manager
            .decrement_all(&[StockLine::new(product_id, 2), StockLine::new(product_id, 2)])
            .await
            .unwrap_err();
        assert_eq!(err, StockError::InsufficientStock(product_id));
        assert_eq!(manager.get(&product_id).unwrap().available_quantity, 3);
    }

    #[tokio::test]
    async fn test_unknown_product_and_bad_quantity() {
        let manager = InventoryManager::new();
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        manager.initialize(known, 5);

        let err = manager.decrement_all(&[StockLine::new(unknown, 1)]).await.unwrap_err();
        assert_eq!(err, StockError::ProductNotFound(unknown));

        let err = manager.decrement_all(&[StockLine::new(known, 0)]).await.unwrap_err();
        assert_eq!(
            err,
            StockError::InvalidQuantity {
                product_id: known,
                quantity: 0
            }
        );
        assert_eq!(manager.get(&known).unwrap().available_quantity, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_last_units() {
        let manager = Arc::new(InventoryManager::new());
        let product_id = Uuid::new_v4();
        manager.initialize(product_id, 3);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.conditional_decrement(product_id, 3).await })
        };
        let second = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.conditional_decrement(product_id, 3).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

        assert_eq!(successes, 1);
        assert_eq!(failures, vec![&StockError::InsufficientStock(product_id)]);
        assert_eq!(manager.get(&product_id).unwrap().available_quantity, 0);
    }

    #[tokio::test]
    async fn test_inactive_product_treated_as_unknown() {
        let manager = InventoryManager::new();
        let mut product = Product::new("SKU-1", "Lamp", 4_500, 5);
        product.is_active = false;
        let id = product.id;
        manager.register(product);

        assert_eq!(manager.product(id).await.unwrap(), None);
        assert_eq!(manager.available(id).await.unwrap(), None);
        assert_eq!(
            manager.decrement_all(&[StockLine::new(id, 1)]).await.unwrap_err(),
            StockError::ProductNotFound(id)
        );
    }

    #[tokio::test]
    async fn test_initialize_keeps_registered_price() {
        let manager = InventoryManager::new();
        let product = Product::new("SKU-2", "Chair", 12_000, 1);
        let id = product.id;
        manager.register(product);

        manager.initialize(id, 8);
        let stored = manager.product(id).await.unwrap().unwrap();
        assert_eq!(stored.unit_price, 12_000);
        assert_eq!(stored.available_quantity, 8);
    }

    #[tokio::test]
    async fn test_restock_overflow_rejected() {
        let manager = InventoryManager::new();
        let id = Uuid::new_v4();
        manager.initialize(id, i32::MAX);

        let err = manager.restock(&[StockLine::new(id, 1)]).await.unwrap_err();
        assert_eq!(err, StockError::InvalidQuantity { product_id: id, quantity: 1 });
        assert_eq!(manager.get(&id).unwrap().available_quantity, i32::MAX);
    }
}
