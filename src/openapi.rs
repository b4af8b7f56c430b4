use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = "Checkout, inventory reservation, and payment reconciliation \
for a single-vendor storefront. All money values are computed server-side from \
the catalog; clients never submit prices."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart-to-order conversion"),
        (name = "Orders", description = "Order lifecycle"),
        (name = "Payments", description = "Payment intents and refunds"),
        (name = "Webhooks", description = "Payment processor callbacks")
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::advance_status,
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::refund_payment,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::Address,
            crate::services::payments::PaymentIntentResponse,
            crate::handlers::orders::AdvanceStatusRequest,
            crate::handlers::payments::RefundRequest,
            crate::entities::order::OrderStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn api_doc() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
