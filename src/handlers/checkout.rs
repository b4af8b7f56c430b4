use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use http::StatusCode;

use crate::{
    errors::ServiceError,
    handlers::current_user,
    services::checkout::CheckoutRequest,
    ApiResponse, AppState,
};

/// POST /api/v1/checkout
///
/// Converts the caller's cart into an order. The body carries only an
/// address selection, a shipping method, and an optional coupon code; all
/// money is computed server-side.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock or invalid coupon", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = current_user(&headers)?;
    let response = state.services.checkout.checkout(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}
