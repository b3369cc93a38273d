pub mod product;
pub mod inventory;

pub use product::{Product, StockLine};
pub use inventory::{InventoryManager, StockError, StockStore};
