use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use mercato_core::PaymentEvent;
use mercato_order::Order;

use crate::{error::AppError, state::AppState};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Payment confirmation pushed by the gateway
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<PaymentEvent>,
) -> Result<Json<Order>, AppError> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthenticationError("Missing webhook secret".to_string()))?;

    if !secrets_match(provided, &state.webhook_secret) {
        tracing::warn!(order_id = %event.order_id, "Payment webhook with bad secret rejected");
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }

    tracing::info!(order_id = %event.order_id, status = %event.status, "Received payment webhook");
    Ok(Json(state.orders.apply_payment_event(&event).await?))
}

/// Comparison time does not depend on where the inputs differ
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
