use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable code callers can dispatch on
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Additional detail (validation failures etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Sub-reason attached to a rejected coupon so callers can correct the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CouponRejection {
    Unknown,
    Inactive,
    NotYetActive,
    Expired,
    BelowMinimum,
    LimitExhausted,
    PerUserLimitExhausted,
}

impl CouponRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponRejection::Unknown => "unknown",
            CouponRejection::Inactive => "inactive",
            CouponRejection::NotYetActive => "not-yet-active",
            CouponRejection::Expired => "expired",
            CouponRejection::BelowMinimum => "below-minimum",
            CouponRejection::LimitExhausted => "limit-exhausted",
            CouponRejection::PerUserLimitExhausted => "per-user-limit-exhausted",
        }
    }
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {0} is not active")]
    InactiveProduct(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(CouponRejection),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalStatusTransition { from: String, to: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invariant breach; surfaced loudly, never silently corrected.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::InvariantViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::EmptyCart
            | Self::InactiveProduct(_)
            | Self::BadRequest(_)
            | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::InvalidCoupon(_) | Self::InsufficientStock { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::IllegalStatusTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::EmptyCart => "empty_cart",
            Self::InactiveProduct(_) => "inactive_product",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InvalidCoupon(_) => "invalid_coupon",
            Self::IllegalStatusTransition { .. } => "illegal_status_transition",
            Self::InvalidSignature => "invalid_signature",
            Self::PaymentFailed(_) => "payment_failed",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::Conflict(_) => "conflict",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::InvariantViolation(_) => "Internal invariant violation".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if matches!(self, Self::InvariantViolation(_)) {
            tracing::error!(error = %self, "invariant violation surfaced to handler");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
