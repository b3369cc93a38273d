pub mod models;
pub mod pii;

pub use models::events::{ChangeKind, OrderChangedEvent};
pub use pii::Masked;
