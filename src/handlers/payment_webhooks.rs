use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use bytes::Bytes;
use http::StatusCode;

use crate::{errors::ServiceError, AppState};

/// POST /webhooks/payments
///
/// The processor retries non-2xx responses with backoff; duplicate
/// deliveries are acknowledged without reprocessing.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    request_body = String,
    responses(
        (status = 200, description = "Event processed or idempotently skipped"),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.webhooks.handle(&headers, &body).await?;
    Ok((StatusCode::OK, "ok"))
}
