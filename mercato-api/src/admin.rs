use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use mercato_core::{Identity, PaymentStatus};
use mercato_order::{AdminUpdate, Order, OrderQuery, OrderStatus, SortOrder};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Raw listing filters; parsed here so bad values surface as 400s
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub owner_id: Option<String>,
    pub sort: Option<String>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, AppError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        let payment_status = self
            .payment_status
            .as_deref()
            .map(PaymentStatus::normalize)
            .transpose()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") | Some("newest") | Some("desc") => SortOrder::NewestFirst,
            Some("oldest") | Some("asc") => SortOrder::OldestFirst,
            Some(other) => return Err(AppError::ValidationError(format!("Unknown sort order: {}", other))),
        };

        Ok(OrderQuery {
            status,
            payment_status,
            owner_id: self.owner_id.filter(|owner| !owner.trim().is_empty()),
            sort,
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/orders", get(list_orders))
        .route("/v1/admin/orders/{id}", patch(update_order).delete(delete_order))
}

/// GET /v1/admin/orders
async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<Order>>, AppError> {
    let query = params.into_query()?;
    Ok(Json(state.orders.admin_list(&identity, &query).await?))
}

/// PATCH /v1/admin/orders/{id}
async fn update_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
    Json(update): Json<AdminUpdate>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.admin_update(&identity, order_id, update).await?))
}

/// DELETE /v1/admin/orders/{id}
async fn delete_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.orders.admin_delete(&identity, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
