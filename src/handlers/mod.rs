pub mod checkout;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    services::{
        checkout::CheckoutService,
        coupons::CouponService,
        inventory::InventoryService,
        orders::OrderService,
        payments::{HttpPaymentGateway, PaymentGateway, PaymentService},
        reaper::ReaperService,
        webhook_processor::WebhookProcessor,
    },
};
use axum::http::HeaderMap;
use std::sync::Arc;
use uuid::Uuid;

pub use crate::AppState;

/// Services container used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: InventoryService,
    pub coupons: CouponService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub webhooks: WebhookProcessor,
    pub reaper: Arc<ReaperService>,
}

impl AppServices {
    /// Builds the service graph over a shared pool, config, and event queue,
    /// talking to the real payment processor.
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, event_sender: EventSender) -> Self {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
            config.payment_processor.base_url.clone(),
            config.payment_processor.api_key.clone(),
        ));
        Self::with_gateway(db, config, event_sender, gateway)
    }

    /// Same graph with a caller-supplied gateway; tests use this seam.
    pub fn with_gateway(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let coupons = CouponService::new(event_sender.clone());
        let orders = OrderService::new(db.clone(), inventory.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db.clone(),
            inventory.clone(),
            coupons.clone(),
            event_sender.clone(),
            config.clone(),
        );
        let payments = PaymentService::new(db.clone(), gateway, event_sender.clone());
        let webhooks = WebhookProcessor::new(
            db.clone(),
            orders.clone(),
            event_sender.clone(),
            config.payment_processor.webhook_secret.clone(),
            config.payment_processor.webhook_tolerance_secs,
        );
        let reaper = Arc::new(ReaperService::new(
            db,
            orders.clone(),
            event_sender,
            config.reaper.clone(),
        ));

        Self {
            inventory,
            coupons,
            checkout,
            orders,
            payments,
            webhooks,
            reaper,
        }
    }
}

/// Identity of the calling user, established by the out-of-scope auth layer
/// and forwarded as a header.
pub fn current_user(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing or invalid x-user-id".to_string()))
}
