use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{cart, cart_item, coupon, coupon::DiscountKind, product},
    errors::ServiceError,
    events::{EventSender, TracingNotificationSink},
    handlers::AppServices,
    migrator::Migrator,
    services::payments::{
        CreateIntentRequest, GatewayRefundRequest, IntentCreated, PaymentGateway, RefundCreated,
    },
    app_router, AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// Gateway double that hands out deterministic intents and records every
/// call, keyed by idempotency key the way the real processor would be.
pub struct MockGateway {
    intents: Mutex<HashMap<String, IntentCreated>>,
    refunds: Mutex<Vec<(GatewayRefundRequest, String)>>,
    fail_next: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            refunds: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn intent_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        _request: CreateIntentRequest,
        idempotency_key: &str,
    ) -> Result<IntentCreated, ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "processor unavailable".to_string(),
            ));
        }
        let mut intents = self.intents.lock().unwrap();
        let intent = intents
            .entry(idempotency_key.to_string())
            .or_insert_with(|| IntentCreated {
                provider_intent_id: format!("pi_{}", Uuid::new_v4().simple()),
                client_secret: format!("cs_{}", Uuid::new_v4().simple()),
            });
        Ok(intent.clone())
    }

    async fn refund(
        &self,
        request: GatewayRefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundCreated, ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "processor unavailable".to_string(),
            ));
        }
        self.refunds
            .lock()
            .unwrap()
            .push((request, idempotency_key.to_string()));
        Ok(RefundCreated {
            provider_refund_id: format!("re_{}", Uuid::new_v4().simple()),
        })
    }
}

/// Application harness over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        customize(&mut cfg);

        // A single connection keeps every query on the same in-memory db.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");

        Migrator::up(&pool, None)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let config = Arc::new(cfg);
        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task =
            storefront_api::events::spawn_event_worker(event_rx, Arc::new(TracingNotificationSink));

        let gateway = Arc::new(MockGateway::new());
        let services = AppServices::with_gateway(
            db.clone(),
            config.clone(),
            event_sender.clone(),
            gateway.clone(),
        );

        let state = AppState {
            db,
            config,
            event_sender,
            services,
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Sends a request, optionally as a given user, and returns the response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header("x-user-id", user_id.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    /// Delivers a signed webhook event. `secret` defaults to the test config's
    /// webhook secret when `None`.
    pub async fn deliver_webhook(
        &self,
        payload: &Value,
        secret: Option<&str>,
    ) -> axum::response::Response {
        let body = serde_json::to_vec(payload).expect("serialize webhook payload");
        let secret =
            secret.unwrap_or_else(|| self.state.config.payment_processor.webhook_secret.as_str());
        let ts = Utc::now().timestamp();
        let sig = sign_webhook(ts, &body, secret);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/payments")
            .header("content-type", "application/json")
            .header("x-timestamp", ts.to_string())
            .header("x-signature", sig)
            .body(Body::from(body))
            .expect("build webhook request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook delivery")
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Test Product {sku}")),
            image_url: Set(None),
            price: Set(price),
            is_active: Set(true),
            stock: Set(stock),
            reserved_stock: Set(0),
            low_stock_threshold: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    /// Creates (or reuses) the user's cart and adds the given lines.
    pub async fn seed_cart(&self, user_id: Uuid, lines: &[(Uuid, i32)]) -> cart::Model {
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

        let now = Utc::now();
        let existing = cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.state.db)
            .await
            .expect("query cart");
        let cart_row = match existing {
            Some(row) => row,
            None => cart::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed cart"),
        };

        for (product_id, quantity) in lines {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_row.id),
                product_id: Set(*product_id),
                quantity: Set(*quantity),
                created_at: Set(now),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed cart item");
        }
        cart_row
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        kind: DiscountKind,
        value: Decimal,
        minimum_order: Decimal,
        usage_limit: i32,
        per_user_limit: i32,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_kind: Set(kind),
            discount_value: Set(value),
            minimum_order: Set(minimum_order),
            starts_at: Set(now - chrono::Duration::days(1)),
            expires_at: Set(now + chrono::Duration::days(30)),
            usage_limit: Set(usage_limit),
            per_user_limit: Set(per_user_limit),
            usage_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Parses a money field that may serialize as `"50.00"`, `"50"`, or `50.0`
/// depending on the database backend's decimal round-trip.
pub fn money(value: &Value) -> rust_decimal::Decimal {
    use std::str::FromStr;
    match value {
        Value::String(s) => rust_decimal::Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => {
            rust_decimal::Decimal::from_str(&n.to_string()).expect("decimal number")
        }
        other => panic!("expected a money value, got {other:?}"),
    }
}

pub fn sign_webhook(ts: i64, payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(ts.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Reads the response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Standard checkout payload against the default config's shipping methods.
pub fn checkout_payload(coupon_code: Option<&str>) -> Value {
    serde_json::json!({
        "shipping_address": {
            "name": "Ada Lovelace",
            "line1": "1 Analytical Way",
            "city": "London",
            "postal_code": "N1 9GU",
            "country": "GB"
        },
        "shipping_method": "standard",
        "coupon_code": coupon_code
    })
}
