use crate::{
    config::AppConfig,
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item,
        product::{self, Entity as ProductEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons::CouponService, inventory::InventoryService},
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Characters used for the order-number suffix; ambiguous glyphs excluded.
const ORDER_SUFFIX_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Address payload snapshotted onto the order. Copied at creation so later
/// edits to the customer's address book never alter historical orders.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
}

/// Checkout input: addresses, shipping method, optional coupon. No price,
/// tax, or total field exists here; money is computed server-side only.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: Address,
    /// Defaults to the shipping address when absent.
    #[validate]
    pub billing_address: Option<Address>,
    #[validate(length(min = 1))]
    pub shipping_method: String,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Checkout orchestrator: converts a cart into a durable order inside one
/// atomic transaction. Either the order, its item snapshots, the stock
/// reservations, and the coupon usage all commit together, or none do.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    coupons: CouponService,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        coupons: CouponService,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            inventory,
            coupons,
            event_sender,
            config,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;

        let shipping_method = self
            .config
            .shipping_method(&request.shipping_method)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "unknown shipping method '{}'",
                    request.shipping_method
                ))
            })?
            .clone();

        let txn = self.db.begin().await?;

        // Re-read the cart under the transaction; nothing computed earlier in
        // the request is trusted.
        let cart = CartEntity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::EmptyCart)?;
        let lines = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Price every line from the current catalog row.
        let mut priced: Vec<(cart_item::Model, product::Model)> = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "cart line for product {} has non-positive quantity",
                    line.product_id
                )));
            }
            let product = ProductEntity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;
            if !product.is_active {
                return Err(ServiceError::InactiveProduct(product.id));
            }
            subtotal += product.price * Decimal::from(line.quantity);
            priced.push((line, product));
        }
        let subtotal = subtotal.round_dp(2);

        let order_id = Uuid::new_v4();

        // Coupon: re-validate and record usage atomically with everything
        // else; a later failure in this transaction rolls the usage back.
        let (coupon_code, discount) = match &request.coupon_code {
            Some(code) => {
                let (coupon, discount) = self
                    .coupons
                    .redeem(&txn, code, user_id, order_id, subtotal)
                    .await?;
                (Some(coupon.code), discount)
            }
            None => (None, Decimal::ZERO),
        };

        // Reserve stock per line. The conditional update re-checks
        // availability under the transaction, closing the race against
        // concurrent checkouts of the same product.
        for (line, product) in &priced {
            self.inventory
                .reserve(&txn, product.id, line.quantity, Some(user_id.to_string()))
                .await?;
        }

        let tax_rate = self.config.tax_rate_for(&request.shipping_address.country);
        let tax_total = ((subtotal - discount) * tax_rate).round_dp(2);
        let shipping_total = shipping_method.rate;
        let total = subtotal - discount + tax_total + shipping_total;

        let order_number = self.generate_order_number(&txn).await?;
        let billing = request
            .billing_address
            .clone()
            .unwrap_or_else(|| request.shipping_address.clone());
        let now = Utc::now();

        let order_row = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            order_number: Set(order_number.clone()),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            tax_total: Set(tax_total),
            shipping_total: Set(shipping_total),
            discount_total: Set(discount),
            total: Set(total),
            currency: Set(self.config.currency.clone()),
            coupon_code: Set(coupon_code),
            shipping_address: Set(serde_json::to_value(&request.shipping_address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            billing_address: Set(serde_json::to_value(&billing)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order_model = order_row.insert(&txn).await?;

        let mut items = Vec::with_capacity(priced.len());
        for (line, product) in &priced {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                sku: Set(product.sku.clone()),
                name: Set(product.name.clone()),
                image_url: Set(product.image_url.clone()),
                unit_price: Set(product.price),
                quantity: Set(line.quantity),
                line_total: Set((product.price * Decimal::from(line.quantity)).round_dp(2)),
                created_at: Set(now),
            };
            items.push(item.insert(&txn).await?);
        }

        // Clear the cart's lines, not the shell.
        CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            %total,
            "checkout completed"
        );
        self.event_sender.emit(Event::OrderCreated {
            order_id,
            order_number,
            user_id,
            total,
        });
        self.event_sender.emit(Event::CheckoutCompleted {
            cart_id: cart.id,
            order_id,
        });

        Ok(CheckoutResponse {
            order: order_model,
            items,
        })
    }

    /// `ORD-YYYYMMDD-XXXX`. The existence probe runs inside the checkout
    /// transaction; the unique index on `order_number` is the backstop.
    async fn generate_order_number(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<String, ServiceError> {
        let date = Utc::now().format("%Y%m%d");
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let suffix: String = {
                let mut rng = rand::thread_rng();
                (0..4)
                    .map(|_| {
                        let idx = rng.gen_range(0..ORDER_SUFFIX_CHARSET.len());
                        ORDER_SUFFIX_CHARSET[idx] as char
                    })
                    .collect()
            };
            let candidate = format!("ORD-{date}-{suffix}");
            let taken = OrderEntity::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .one(txn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".to_string(),
        ))
    }
}
