use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{errors::ServiceError, handlers::current_user, ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Defaults to the full payment amount.
    pub amount: Option<Decimal>,
}

/// POST /api/v1/orders/{id}/payment-intent
///
/// Idempotent per order: repeated calls for a live attempt return the same
/// provider intent.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-intent",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 201, description = "Payment intent ready", body = crate::services::payments::PaymentIntentResponse),
        (status = 409, description = "Order not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = current_user(&headers)?;
    let order = state.services.orders.get_order(id).await?;
    if order.user_id != user_id {
        return Err(ServiceError::NotFound(format!("Order {id} not found")));
    }
    let intent = state.services.payments.create_intent(id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(intent))))
}

/// POST /api/v1/payments/{id}/refund
///
/// Moves a succeeded payment to refund_pending; the webhook confirms the
/// final outcome.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment id")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund initiated"),
        (status = 409, description = "Payment not refundable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.services.payments.refund(id, request.amount).await?;
    Ok(Json(ApiResponse::success(updated)))
}
