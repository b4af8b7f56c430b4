use crate::{
    config::ReaperConfig,
    entities::{
        order::{Entity as OrderEntity, OrderStatus},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
        stock_movement::{self, Entity as StockMovementEntity},
        webhook_event::{self, Entity as WebhookEventEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::OrderService,
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Timer-driven compensation sweeps: expiring abandoned payments and pruning
/// aged ledger rows. Expiry is a local compensating action, not a substitute
/// for webhook reconciliation; a webhook arriving after expiry hits the
/// idempotency ledger and the already-terminal payment, and applies nothing.
#[derive(Clone)]
pub struct ReaperService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    event_sender: EventSender,
    config: ReaperConfig,
}

impl ReaperService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        event_sender: EventSender,
        config: ReaperConfig,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
            config,
        }
    }

    /// Expires payments stuck in PENDING past the configured window:
    /// cancels the order (releasing its reservations) and marks the payment
    /// FAILED locally. Each payment is handled in its own transaction so one
    /// bad row does not stall the sweep.
    #[instrument(skip(self))]
    pub async fn expire_abandoned_payments(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::hours(self.config.payment_expiry_hours);
        let stale = PaymentEntity::find()
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .filter(payment::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut expired = 0u64;
        for row in stale {
            match self.expire_one(row).await {
                Ok(()) => expired += 1,
                Err(e) => warn!(error = %e, "failed to expire abandoned payment"),
            }
        }
        if expired > 0 {
            info!(expired, "abandoned payments expired");
        }
        Ok(expired)
    }

    async fn expire_one(&self, row: payment::Model) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        // Re-read under the transaction; a webhook may have settled it since
        // the scan.
        let Some(current) = PaymentEntity::find_by_id(row.id).one(&txn).await? else {
            return Ok(());
        };
        if current.status != PaymentStatus::Pending {
            return Ok(());
        }

        let payment_id = current.id;
        let order_id = current.order_id;

        let order_row = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        if order_row.status == OrderStatus::Pending {
            self.orders
                .cancel_order(&txn, order_id, Some("reaper".into()))
                .await?;
        }

        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Failed);
        active.error_code = Set(Some("expired".to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender.emit(Event::PaymentExpired {
            payment_id,
            order_id,
        });
        Ok(())
    }

    /// Prunes ledger rows past the retention window. Retention is an
    /// operational concern only; correctness never depends on pruned rows.
    #[instrument(skip(self))]
    pub async fn prune_aged_rows(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::days(self.config.ledger_retention_days);

        let movements = StockMovementEntity::delete_many()
            .filter(stock_movement::Column::CreatedAt.lt(cutoff))
            .exec(&*self.db)
            .await?
            .rows_affected;
        let events = WebhookEventEntity::delete_many()
            .filter(webhook_event::Column::ProcessedAt.lt(cutoff))
            .exec(&*self.db)
            .await?
            .rows_affected;

        if movements + events > 0 {
            info!(movements, events, "pruned aged ledger rows");
        }
        Ok(movements + events)
    }
}

/// Wires the two sweeps onto independent timers.
pub fn spawn_reaper(reaper: Arc<ReaperService>) -> Vec<JoinHandle<()>> {
    let payment_interval = std::time::Duration::from_secs(reaper.config.payment_sweep_interval_secs);
    let prune_interval = std::time::Duration::from_secs(reaper.config.prune_interval_secs);

    let payments = {
        let reaper = reaper.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(payment_interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                if let Err(e) = reaper.expire_abandoned_payments().await {
                    error!(error = %e, "payment expiry sweep failed");
                }
            }
        })
    };

    let pruning = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = reaper.prune_aged_rows().await {
                error!(error = %e, "ledger pruning sweep failed");
            }
        }
    });

    vec![payments, pruning]
}
