use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{order, order_item, order::OrderStatus},
    errors::ServiceError,
    handlers::current_user,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// GET /api/v1/orders/{id}
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with line items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = current_user(&headers)?;
    let order = state.services.orders.get_order(id).await?;
    if order.user_id != user_id {
        return Err(ServiceError::NotFound(format!("Order {id} not found")));
    }
    let items = state.services.orders.get_order_items(id).await?;
    Ok(Json(ApiResponse::success(OrderWithItems { order, items })))
}

/// POST /api/v1/orders/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 409, description = "Illegal transition or refund required", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = current_user(&headers)?;
    let order = state.services.orders.get_order(id).await?;
    if order.user_id != user_id {
        return Err(ServiceError::NotFound(format!("Order {id} not found")));
    }

    let txn = state.db.begin().await?;
    let cancelled = state
        .services
        .orders
        .cancel_order(&txn, id, Some(user_id.to_string()))
        .await?;
    txn.commit().await?;

    Ok(Json(ApiResponse::success(cancelled)))
}

/// POST /api/v1/orders/{id}/status
///
/// Admin fulfillment advance: confirmed -> processing -> shipped -> delivered.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = AdvanceStatusRequest,
    responses(
        (status = 200, description = "Status advanced"),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn advance_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AdvanceStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .orders
        .advance_status(id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
