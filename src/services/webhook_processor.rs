use crate::{
    entities::{
        order::{Entity as OrderEntity, OrderStatus},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
        webhook_event::{self, Entity as WebhookEventEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::OrderService,
};
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Processor event envelope: `{id, type, data}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    fn intent_id(&self) -> Option<&str> {
        self.data.get("intent_id").and_then(|v| v.as_str())
    }

    fn error_code(&self) -> Option<String> {
        self.data
            .get("error_code")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// Applies processor events to payments and orders, exactly once.
///
/// The `webhook_events` insert is the first statement of the transaction
/// that applies the business effect: a crash mid-processing rolls both back
/// so the processor's retry re-applies them, and a concurrent or repeated
/// delivery trips the unique constraint and is acknowledged as a no-op.
#[derive(Clone)]
pub struct WebhookProcessor {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    event_sender: EventSender,
    secret: String,
    tolerance_secs: u64,
}

impl WebhookProcessor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        event_sender: EventSender,
        secret: String,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
            secret,
            tolerance_secs,
        }
    }

    #[instrument(skip(self, headers, body))]
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), ServiceError> {
        if !verify_signature(headers, body, &self.secret, self.tolerance_secs) {
            warn!("webhook signature verification failed");
            return Err(ServiceError::InvalidSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {e}")))?;

        let txn = self.db.begin().await?;

        // Idempotency gate, first statement of the unit.
        let gate = webhook_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_event_id: Set(envelope.id.clone()),
            event_type: Set(envelope.event_type.clone()),
            payload_digest: Set(hex::encode(Sha256::digest(body))),
            processed_at: Set(Utc::now()),
        };
        match gate.insert(&txn).await {
            Ok(_) => {}
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(event_id = %envelope.id, "duplicate webhook delivery, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let emitted = self.apply(&txn, &envelope).await?;
        txn.commit().await?;

        for event in emitted {
            self.event_sender.emit(event);
        }
        Ok(())
    }

    /// Dispatches a first-seen event. Returns domain events to emit after
    /// the transaction commits.
    async fn apply<C: ConnectionTrait>(
        &self,
        txn: &C,
        envelope: &WebhookEnvelope,
    ) -> Result<Vec<Event>, ServiceError> {
        match envelope.event_type.as_str() {
            "payment_succeeded" => self.on_payment_succeeded(txn, envelope).await,
            "payment_failed" => self.on_payment_failed(txn, envelope).await,
            "refund_succeeded" => {
                self.on_refund_settled(txn, envelope, PaymentStatus::Refunded)
                    .await
            }
            "refund_failed" => {
                self.on_refund_settled(txn, envelope, PaymentStatus::RefundFailed)
                    .await
            }
            other => {
                // Forward compatibility: record in the ledger, apply nothing.
                info!(event_type = other, "ignoring unknown webhook event type");
                Ok(Vec::new())
            }
        }
    }

    async fn on_payment_succeeded<C: ConnectionTrait>(
        &self,
        txn: &C,
        envelope: &WebhookEnvelope,
    ) -> Result<Vec<Event>, ServiceError> {
        let Some(payment_row) = self.payment_for(txn, envelope).await? else {
            return Ok(Vec::new());
        };

        // A late success against an expired or already-settled payment is
        // recorded but must not resurrect the order.
        if payment_row.status != PaymentStatus::Pending {
            info!(
                payment_id = %payment_row.id,
                status = payment_row.status.as_str(),
                "ignoring payment_succeeded for non-pending payment"
            );
            return Ok(Vec::new());
        }

        let payment_id = payment_row.id;
        let order_id = payment_row.order_id;
        self.set_payment_status(txn, payment_row, PaymentStatus::Succeeded, None)
            .await?;
        self.orders.confirm_paid(txn, order_id).await?;

        Ok(vec![Event::PaymentSucceeded {
            payment_id,
            order_id,
        }])
    }

    async fn on_payment_failed<C: ConnectionTrait>(
        &self,
        txn: &C,
        envelope: &WebhookEnvelope,
    ) -> Result<Vec<Event>, ServiceError> {
        let Some(payment_row) = self.payment_for(txn, envelope).await? else {
            return Ok(Vec::new());
        };
        if payment_row.status != PaymentStatus::Pending {
            info!(
                payment_id = %payment_row.id,
                status = payment_row.status.as_str(),
                "ignoring payment_failed for non-pending payment"
            );
            return Ok(Vec::new());
        }

        let payment_id = payment_row.id;
        let order_id = payment_row.order_id;
        let error_code = envelope.error_code();
        self.set_payment_status(txn, payment_row, PaymentStatus::Failed, error_code.clone())
            .await?;

        // Release the reservation unless another live attempt is in flight.
        let other_live = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Id.ne(payment_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .one(txn)
            .await?;
        if other_live.is_none() {
            let order_row = OrderEntity::find_by_id(order_id)
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
            if order_row.status == OrderStatus::Pending {
                self.orders
                    .cancel_order(txn, order_id, Some("payment_failed".into()))
                    .await?;
            }
        }

        Ok(vec![Event::PaymentFailed {
            payment_id,
            order_id,
            error_code,
        }])
    }

    async fn on_refund_settled<C: ConnectionTrait>(
        &self,
        txn: &C,
        envelope: &WebhookEnvelope,
        outcome: PaymentStatus,
    ) -> Result<Vec<Event>, ServiceError> {
        let Some(payment_row) = self.payment_for(txn, envelope).await? else {
            return Ok(Vec::new());
        };
        if payment_row.status != PaymentStatus::RefundPending {
            info!(
                payment_id = %payment_row.id,
                status = payment_row.status.as_str(),
                "ignoring refund outcome for payment not awaiting refund"
            );
            return Ok(Vec::new());
        }

        let payment_id = payment_row.id;
        let order_id = payment_row.order_id;
        self.set_payment_status(txn, payment_row, outcome, None)
            .await?;

        let event = match outcome {
            PaymentStatus::Refunded => Event::PaymentRefunded {
                payment_id,
                order_id,
            },
            PaymentStatus::RefundFailed => {
                // Never auto-retried; an operator has to follow up.
                error!(payment_id = %payment_id, order_id = %order_id, "refund failed at processor");
                Event::RefundFailed {
                    payment_id,
                    order_id,
                }
            }
            _ => unreachable!("refund outcomes are refunded or refund_failed"),
        };
        Ok(vec![event])
    }

    async fn payment_for<C: ConnectionTrait>(
        &self,
        txn: &C,
        envelope: &WebhookEnvelope,
    ) -> Result<Option<payment::Model>, ServiceError> {
        let Some(intent_id) = envelope.intent_id() else {
            warn!(event_id = %envelope.id, "webhook event carries no intent_id");
            return Ok(None);
        };
        let found = PaymentEntity::find()
            .filter(payment::Column::ProviderIntentId.eq(intent_id))
            .one(txn)
            .await?;
        if found.is_none() {
            warn!(intent_id, "webhook references unknown payment intent");
        }
        Ok(found)
    }

    async fn set_payment_status<C: ConnectionTrait>(
        &self,
        txn: &C,
        payment_row: payment::Model,
        status: PaymentStatus,
        error_code: Option<String>,
    ) -> Result<payment::Model, ServiceError> {
        let mut active: payment::ActiveModel = payment_row.into();
        active.status = Set(status);
        if error_code.is_some() {
            active.error_code = Set(error_code);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(txn).await?)
    }
}

/// Verifies the webhook signature against the shared secret. Supports the
/// generic `x-timestamp`/`x-signature` header pair and the Stripe-style
/// `Stripe-Signature: t=...,v1=...` format.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return check_signed_payload(ts, sig, payload, secret, tolerance_secs);
        }
    }

    if let Some(header) = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in header.split(',') {
            match part.split_once('=') {
                Some(("t", val)) => ts = val,
                Some(("v1", val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return check_signed_payload(ts, v1, payload, secret, tolerance_secs);
        }
    }

    false
}

fn check_signed_payload(
    ts: &str,
    sig: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            return false;
        }
    } else {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
