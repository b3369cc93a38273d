use crate::inventory::StockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Catalog product as far as the order backend cares about it.
/// `unit_price` is in minor currency units and is what checkout charges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub unit_price: i64,
    pub available_quantity: i32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, unit_price: i64, available_quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            sku: sku.into(),
            name: name.into(),
            unit_price,
            available_quantity,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Stock-only entry for a product known by id
    pub fn stocked(id: Uuid, available_quantity: i32) -> Self {
        Self {
            id,
            sku: id.to_string(),
            name: String::new(),
            unit_price: 0,
            available_quantity,
            is_active: true,
            updated_at: Utc::now(),
        }
    }
}

/// One product/quantity pair to take out of (or put back into) stock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

impl StockLine {
    pub fn new(product_id: Uuid, quantity: i32) -> Self {
        Self { product_id, quantity }
    }

    /// Sum quantities per product, ordered by product id.
    ///
    /// Stores lock rows in this order so two batches touching the same
    /// products cannot deadlock. A sum past `i32::MAX` is reported as an
    /// invalid quantity for that product.
    pub fn consolidate(lines: &[StockLine]) -> Result<Vec<StockLine>, StockError> {
        let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in lines {
            let total = merged.entry(line.product_id).or_insert(0);
            *total = total.checked_add(line.quantity).ok_or(StockError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            })?;
        }
        Ok(merged
            .into_iter()
            .map(|(product_id, quantity)| StockLine { product_id, quantity })
            .collect())
    }

    /// Reject non-positive quantities, then consolidate.
    pub fn validate_all(lines: &[StockLine]) -> Result<Vec<StockLine>, StockError> {
        if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
            return Err(StockError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        Self::consolidate(lines)
    }
}
