use crate::middleware::auth::JwtVerifier;
use mercato_order::{FanoutRouter, OrderService};
use mercato_store::{DbClient, RedisClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub fanout: Arc<FanoutRouter>,
    pub verifier: Arc<JwtVerifier>,
    /// Absent in tests; health then skips the database round trip
    pub db: Option<Arc<DbClient>>,
    /// Rate limiting is skipped without it
    pub redis: Option<Arc<RedisClient>>,
    pub webhook_secret: Arc<str>,
    /// Parent of every realtime connection's token
    pub shutdown: CancellationToken,
}
