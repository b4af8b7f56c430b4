use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order lifecycle state machine.
///
/// The only component allowed to write `orders.status`. Transitions that
/// carry inventory side effects (confirm, cancel) take the caller's
/// transaction so the status write and the stock mutation commit together.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    event_sender: EventSender,
}

/// Legal edges of the lifecycle graph.
pub fn is_legal_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, Processing)
            | (Confirmed, Cancelled)
            | (Processing, Shipped)
            | (Shipped, Delivered)
    )
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// PENDING -> CONFIRMED on successful payment: converts every line's
    /// reservation into a permanent deduction, then flips the status, all on
    /// the caller's transaction.
    #[instrument(skip(self, txn))]
    pub async fn confirm_paid<C: ConnectionTrait>(
        &self,
        txn: &C,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find_in_txn(txn, order_id).await?;
        self.require_edge(&order, OrderStatus::Confirmed)?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await?;
        for item in &items {
            self.inventory
                .commit_sale(txn, item.product_id, item.quantity, Some("payment".into()))
                .await?;
        }

        self.apply_status(txn, order, OrderStatus::Confirmed).await
    }

    /// Cancellation. From PENDING, releases every line's reservation. From
    /// CONFIRMED, stock was already committed: a SUCCEEDED payment must have
    /// its refund initiated first, and the committed units are restocked as
    /// RETURN movements.
    #[instrument(skip(self, txn))]
    pub async fn cancel_order<C: ConnectionTrait>(
        &self,
        txn: &C,
        order_id: Uuid,
        actor: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find_in_txn(txn, order_id).await?;
        self.require_edge(&order, OrderStatus::Cancelled)?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await?;

        match order.status {
            OrderStatus::Pending => {
                for item in &items {
                    self.inventory
                        .release(txn, item.product_id, item.quantity, actor.clone())
                        .await?;
                }
                // Settle in-flight payment attempts so a late success webhook
                // lands on a terminal payment and applies nothing, instead of
                // retrying an illegal Cancelled -> Confirmed edge forever.
                let live = PaymentEntity::find()
                    .filter(payment::Column::OrderId.eq(order_id))
                    .filter(payment::Column::Status.eq(PaymentStatus::Pending))
                    .all(txn)
                    .await?;
                for row in live {
                    let payment_id = row.id;
                    let mut active: payment::ActiveModel = row.into();
                    active.status = Set(PaymentStatus::Failed);
                    active.error_code = Set(Some("cancelled".to_string()));
                    active.updated_at = Set(Utc::now());
                    active.update(txn).await?;
                    self.event_sender.emit(Event::PaymentFailed {
                        payment_id,
                        order_id,
                        error_code: Some("cancelled".to_string()),
                    });
                }
            }
            OrderStatus::Confirmed => {
                let live_paid = PaymentEntity::find()
                    .filter(payment::Column::OrderId.eq(order_id))
                    .filter(payment::Column::Status.eq(PaymentStatus::Succeeded))
                    .one(txn)
                    .await?;
                if live_paid.is_some() {
                    return Err(ServiceError::Conflict(
                        "order has a succeeded payment; initiate a refund before cancelling"
                            .to_string(),
                    ));
                }
                for item in &items {
                    self.inventory
                        .restock_return(txn, item.product_id, item.quantity, actor.clone())
                        .await?;
                }
            }
            // require_edge already rejected everything else
            _ => unreachable!("cancel guarded by transition table"),
        }

        self.apply_status(txn, order, OrderStatus::Cancelled).await
    }

    /// Admin-driven fulfillment advance (CONFIRMED -> PROCESSING -> SHIPPED
    /// -> DELIVERED). No inventory effect; runs in its own transaction.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        if !matches!(
            new_status,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(ServiceError::BadRequest(format!(
                "status {} is not an admin fulfillment stage",
                new_status.as_str()
            )));
        }

        let txn = self.db.begin().await?;
        let order = self.find_in_txn(&txn, order_id).await?;
        self.require_edge(&order, new_status)?;
        let updated = self.apply_status(&txn, order, new_status).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn find_in_txn<C: ConnectionTrait>(
        &self,
        txn: &C,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    fn require_edge(&self, order: &order::Model, to: OrderStatus) -> Result<(), ServiceError> {
        if !is_legal_transition(order.status, to) {
            return Err(ServiceError::IllegalStatusTransition {
                from: order.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn apply_status<C: ConnectionTrait>(
        &self,
        txn: &C,
        order: order::Model,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order_id = order.id;
        let old_status = order.status;

        let mut active: order::ActiveModel = order.into();
        let version = *active.version.as_ref();
        active.status = Set(new_status);
        active.version = Set(version + 1);
        active.updated_at = Set(Utc::now());
        let updated = active.update(txn).await?;

        info!(
            order_id = %order_id,
            from = old_status.as_str(),
            to = new_status.as_str(),
            "order status changed"
        );
        self.event_sender.emit(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
        });

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn lifecycle_graph_edges() {
        assert!(is_legal_transition(Pending, Confirmed));
        assert!(is_legal_transition(Pending, Cancelled));
        assert!(is_legal_transition(Confirmed, Processing));
        assert!(is_legal_transition(Confirmed, Cancelled));
        assert!(is_legal_transition(Processing, Shipped));
        assert!(is_legal_transition(Shipped, Delivered));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for to in [Pending, Confirmed, Processing, Shipped, Delivered, Cancelled] {
            assert!(!is_legal_transition(Delivered, to), "delivered -> {to:?}");
            assert!(!is_legal_transition(Cancelled, to), "cancelled -> {to:?}");
        }
    }

    #[test]
    fn no_backwards_or_skipping_edges() {
        assert!(!is_legal_transition(Shipped, Pending));
        assert!(!is_legal_transition(Processing, Cancelled));
        assert!(!is_legal_transition(Shipped, Cancelled));
        assert!(!is_legal_transition(Pending, Processing));
        assert!(!is_legal_transition(Confirmed, Shipped));
        assert!(!is_legal_transition(Pending, Delivered));
    }
}
