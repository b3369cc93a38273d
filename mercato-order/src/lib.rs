pub mod models;
pub mod machine;
pub mod stock;
pub mod eligibility;
pub mod changes;
pub mod repository;
pub mod fanout;
pub mod hub;
pub mod service;

pub use models::{Order, OrderItem, OrderStatus, ReturnRequest, TotalOverflow, UnknownStatus};
pub use machine::{CancelError, StateMachine, Transition, TransitionError};
pub use stock::{reduction_due, StockLedger, StockReceipt};
pub use eligibility::IneligibilityReason;
pub use changes::{AdminUpdate, AppliedChange, ChangeError, ChangeHandler};
pub use repository::{InMemoryOrderRepository, OrderQuery, OrderRepository, RepositoryError, SortOrder};
pub use fanout::{FanoutError, FanoutRouter, Subscription, Topic, Transport, TransportError};
pub use hub::TopicHub;
pub use service::{NewOrder, OrderService, ServiceError, ServiceSettings};
