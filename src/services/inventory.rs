use crate::{
    entities::{
        product::{self, Entity as ProductEntity},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Inventory reservation ledger.
///
/// Every mutator updates the product's stock counters and appends exactly one
/// `stock_movement` row in the same atomic step, against whatever connection
/// the caller passes in. Concurrent mutations of the same product serialize
/// on a conditional UPDATE of its row: if the guard no longer holds at commit
/// time, zero rows are affected and the operation fails without a lost
/// update.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Holds `qty` units for an unconfirmed order.
    #[instrument(skip(self, conn))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        qty: i32,
        actor: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        require_positive(qty)?;

        let affected = ProductEntity::update_many()
            .col_expr(
                product::Column::ReservedStock,
                Expr::col(product::Column::ReservedStock).add(qty),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(Expr::cust_with_values(
                "stock - reserved_stock >= ?",
                [qty],
            ))
            .exec(conn)
            .await?
            .rows_affected;

        if affected == 0 {
            let current = self.find_product(conn, product_id).await?;
            return Err(ServiceError::InsufficientStock {
                product_id,
                requested: qty,
                available: current.available_stock(),
            });
        }

        let after = self.find_product(conn, product_id).await?;
        self.append_movement(conn, &after, MovementType::Reservation, qty, actor)
            .await?;
        self.check_low_stock(&after);
        Ok(after)
    }

    /// Returns a reservation to the available pool without touching on-hand
    /// stock. Used when an order is cancelled or a payment permanently fails.
    #[instrument(skip(self, conn))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        qty: i32,
        actor: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        require_positive(qty)?;

        let affected = ProductEntity::update_many()
            .col_expr(
                product::Column::ReservedStock,
                Expr::col(product::Column::ReservedStock).sub(qty),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::ReservedStock.gte(qty))
            .exec(conn)
            .await?
            .rows_affected;

        if affected == 0 {
            return Err(ServiceError::InvariantViolation(format!(
                "release of {qty} units for product {product_id} exceeds reserved stock"
            )));
        }

        let after = self.find_product(conn, product_id).await?;
        self.append_movement(conn, &after, MovementType::Release, -qty, actor)
            .await?;
        Ok(after)
    }

    /// Converts a reservation into a permanent deduction when a payment
    /// succeeds. Decrements both counters by the same quantity.
    #[instrument(skip(self, conn))]
    pub async fn commit_sale<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        qty: i32,
        actor: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        require_positive(qty)?;

        let affected = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(qty),
            )
            .col_expr(
                product::Column::ReservedStock,
                Expr::col(product::Column::ReservedStock).sub(qty),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::ReservedStock.gte(qty))
            .filter(product::Column::Stock.gte(qty))
            .exec(conn)
            .await?
            .rows_affected;

        if affected == 0 {
            return Err(ServiceError::InvariantViolation(format!(
                "sale commit of {qty} units for product {product_id} exceeds reserved stock"
            )));
        }

        let after = self.find_product(conn, product_id).await?;
        self.append_movement(conn, &after, MovementType::Sale, -qty, actor)
            .await?;
        self.check_low_stock(&after);
        Ok(after)
    }

    /// Returns committed stock to the on-hand pool, e.g. when a paid order is
    /// cancelled after its reservations were converted to a sale.
    #[instrument(skip(self, conn))]
    pub async fn restock_return<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        qty: i32,
        actor: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        require_positive(qty)?;

        let affected = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(qty),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?
            .rows_affected;

        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {product_id} not found"
            )));
        }

        let after = self.find_product(conn, product_id).await?;
        self.append_movement(conn, &after, MovementType::Return, qty, actor)
            .await?;
        Ok(after)
    }

    /// Admin/operational stock change (restock, damage write-off, return),
    /// independent of any order. Opens its own transaction.
    #[instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        delta: i32,
        reason: MovementType,
        actor: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        if !matches!(
            reason,
            MovementType::Adjustment | MovementType::Restock | MovementType::Return
        ) {
            return Err(ServiceError::BadRequest(format!(
                "{reason:?} is not an operational adjustment reason"
            )));
        }
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "adjustment delta must be non-zero".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        // Guard: on-hand stock may never drop below what is reserved.
        let affected = ProductEntity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(delta),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(Expr::cust_with_values(
                "stock + ? >= reserved_stock",
                [delta],
            ))
            .exec(&txn)
            .await?
            .rows_affected;

        if affected == 0 {
            self.find_product(&txn, product_id).await?;
            return Err(ServiceError::Conflict(format!(
                "adjustment of {delta} for product {product_id} would drop stock below reserved"
            )));
        }

        let after = self.find_product(&txn, product_id).await?;
        self.append_movement(&txn, &after, reason, delta, actor)
            .await?;
        txn.commit().await?;

        info!(product_id = %product_id, delta, "inventory adjusted");
        self.check_low_stock(&after);
        Ok(after)
    }

    pub async fn get_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        self.find_product(conn, product_id).await
    }

    async fn find_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))
    }

    async fn append_movement<C: ConnectionTrait>(
        &self,
        conn: &C,
        after: &product::Model,
        movement_type: MovementType,
        quantity: i32,
        actor: Option<String>,
    ) -> Result<(), ServiceError> {
        let (stock_delta, reserved_delta) = counter_deltas(movement_type, quantity);
        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(after.id),
            movement_type: Set(movement_type),
            quantity: Set(quantity),
            stock_before: Set(after.stock - stock_delta),
            stock_after: Set(after.stock),
            reserved_before: Set(after.reserved_stock - reserved_delta),
            reserved_after: Set(after.reserved_stock),
            actor: Set(actor),
            created_at: Set(Utc::now()),
        };
        movement.insert(conn).await?;
        Ok(())
    }

    /// Best-effort low-stock signal; must never block or fail the mutation.
    fn check_low_stock(&self, product: &product::Model) {
        let available = product.available_stock();
        if available <= product.low_stock_threshold {
            warn!(
                product_id = %product.id,
                available,
                threshold = product.low_stock_threshold,
                "product at or below low-stock threshold"
            );
            self.event_sender.emit(Event::LowStock {
                product_id: product.id,
                available,
                threshold: product.low_stock_threshold,
            });
        }
    }
}

fn require_positive(qty: i32) -> Result<(), ServiceError> {
    if qty <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

/// How each movement type maps onto the two counters.
fn counter_deltas(movement_type: MovementType, quantity: i32) -> (i32, i32) {
    match movement_type {
        MovementType::Reservation => (0, quantity),
        MovementType::Release => (0, quantity),
        MovementType::Sale => (quantity, quantity),
        MovementType::Adjustment | MovementType::Restock | MovementType::Return => (quantity, 0),
    }
}

/// Replays a product's movement history in creation order. Returns the
/// `(stock, reserved_stock)` counters the history implies; used to audit the
/// ledger against the live row.
pub fn replay_movements<'a, I>(start_stock: i32, start_reserved: i32, movements: I) -> (i32, i32)
where
    I: IntoIterator<Item = &'a stock_movement::Model>,
{
    movements
        .into_iter()
        .fold((start_stock, start_reserved), |(stock, reserved), m| {
            let (ds, dr) = counter_deltas(m.movement_type, m.quantity);
            (stock + ds, reserved + dr)
        })
}
