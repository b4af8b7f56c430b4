use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
    },
    errors::ServiceError,
    events::EventSender,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Converts a storefront decimal amount to the processor's integer minor
/// unit. Fails rather than rounds: money with sub-cent precision reaching
/// this boundary is a bug upstream.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = amount * dec!(100);
    if !scaled.fract().is_zero() {
        return Err(ServiceError::InvariantViolation(format!(
            "amount {amount} has sub-cent precision"
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| ServiceError::InvariantViolation(format!("amount {amount} overflows i64")))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub order_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentCreated {
    pub provider_intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayRefundRequest {
    pub provider_intent_id: String,
    pub amount_minor: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundCreated {
    pub provider_refund_id: String,
}

/// Seam to the external payment processor. The HTTP implementation talks to
/// the real API; tests substitute their own.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
        idempotency_key: &str,
    ) -> Result<IntentCreated, ServiceError>;

    async fn refund(
        &self,
        request: GatewayRefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundCreated, ServiceError>;
}

/// Processor client over its HTTP API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: &str,
    ) -> Result<R, ServiceError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "processor returned {status}: {text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("processor response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
        idempotency_key: &str,
    ) -> Result<IntentCreated, ServiceError> {
        self.post("/v1/payment_intents", &request, idempotency_key)
            .await
    }

    async fn refund(
        &self,
        request: GatewayRefundRequest,
        idempotency_key: &str,
    ) -> Result<RefundCreated, ServiceError> {
        self.post("/v1/refunds", &request, idempotency_key).await
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub payment_id: Uuid,
    pub provider_intent_id: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Payment gateway adapter: creates intents and issues refunds against the
/// processor, keeping exactly one live payment row per order.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Requests a payment intent for an order. Idempotent per order: a live
    /// PENDING payment is reused (the idempotency key makes the processor
    /// return the same intent); a new row is only created on first call or
    /// after a FAILED attempt. Deliberately not part of the checkout
    /// transaction: a processor failure here leaves the order PENDING with
    /// no payment, safely retryable.
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        order_id: Uuid,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "order {} is {}, not awaiting payment",
                order.order_number,
                order.status.as_str()
            )));
        }

        let existing_live = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .one(&*self.db)
            .await?;

        // Attempt ordinal keys the idempotency: retry after FAILED gets a
        // fresh intent, a duplicate call for the live attempt gets the same
        // one back.
        let attempts = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .count(&*self.db)
            .await?;
        let attempt = if existing_live.is_some() {
            attempts
        } else {
            attempts + 1
        };
        let idempotency_key = format!("order-{order_id}-attempt-{attempt}");

        let intent = self
            .gateway
            .create_intent(
                CreateIntentRequest {
                    amount_minor: to_minor_units(order.total)?,
                    currency: order.currency.clone(),
                    order_number: order.order_number.clone(),
                },
                &idempotency_key,
            )
            .await?;

        let payment_model = match existing_live {
            Some(live) => live,
            None => {
                let now = Utc::now();
                let row = payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    provider_intent_id: Set(intent.provider_intent_id.clone()),
                    status: Set(PaymentStatus::Pending),
                    amount: Set(order.total),
                    currency: Set(order.currency.clone()),
                    error_code: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                row.insert(&*self.db).await?
            }
        };

        info!(
            order_id = %order_id,
            payment_id = %payment_model.id,
            intent = %intent.provider_intent_id,
            "payment intent ready"
        );

        Ok(PaymentIntentResponse {
            payment_id: payment_model.id,
            provider_intent_id: intent.provider_intent_id,
            client_secret: intent.client_secret,
            amount: payment_model.amount,
            currency: payment_model.currency,
        })
    }

    /// Initiates a refund for a SUCCEEDED payment. The payment moves to
    /// REFUND_PENDING immediately; a later webhook confirms REFUNDED or
    /// reports REFUND_FAILED.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<payment::Model, ServiceError> {
        let payment_row = PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;

        if payment_row.status != PaymentStatus::Succeeded {
            return Err(ServiceError::Conflict(format!(
                "payment {} is {}; only succeeded payments can be refunded",
                payment_id,
                payment_row.status.as_str()
            )));
        }

        let amount = amount.unwrap_or(payment_row.amount);
        if amount <= Decimal::ZERO || amount > payment_row.amount {
            return Err(ServiceError::ValidationError(format!(
                "refund amount {amount} must be positive and at most {}",
                payment_row.amount
            )));
        }

        let refund = self
            .gateway
            .refund(
                GatewayRefundRequest {
                    provider_intent_id: payment_row.provider_intent_id.clone(),
                    amount_minor: to_minor_units(amount)?,
                },
                &format!("refund-{payment_id}"),
            )
            .await?;

        let mut active: payment::ActiveModel = payment_row.into();
        active.status = Set(PaymentStatus::RefundPending);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(
            payment_id = %payment_id,
            refund_id = %refund.provider_refund_id,
            %amount,
            "refund initiated"
        );
        Ok(updated)
    }

    pub async fn payments_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        Ok(PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }
}
