use crate::{
    entities::{
        coupon::{self, DiscountKind, Entity as CouponEntity},
        coupon_usage::{self, Entity as CouponUsageEntity},
    },
    errors::{CouponRejection, ServiceError},
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

/// Coupon usage ledger.
///
/// The global limit is enforced by a conditional increment of the coupon's
/// `usage_count`: the row write it takes also serializes concurrent
/// redemptions of the same code, so the per-user count that follows cannot
/// race another redemption into exceeding its limit. The `coupon_usages`
/// insert lives in the caller's transaction; a failed checkout rolls the
/// counter back with everything else.
#[derive(Clone)]
pub struct CouponService {
    event_sender: EventSender,
}

impl CouponService {
    pub fn new(event_sender: EventSender) -> Self {
        Self { event_sender }
    }

    /// Validates a code against subtotal and validity window without
    /// consuming usage. Limits are only decided at redeem time.
    #[instrument(skip(self, conn))]
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<coupon::Model, ServiceError> {
        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or(ServiceError::InvalidCoupon(CouponRejection::Unknown))?;

        check_redeemable(&coupon, subtotal, now)?;
        Ok(coupon)
    }

    /// Atomically records one usage for `(code, user, order)` and returns the
    /// coupon with its computed discount. Must run inside the checkout
    /// transaction.
    #[instrument(skip(self, txn))]
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        txn: &C,
        code: &str,
        user_id: Uuid,
        order_id: Uuid,
        subtotal: Decimal,
    ) -> Result<(coupon::Model, Decimal), ServiceError> {
        let now = Utc::now();
        let coupon = self.validate(txn, code, subtotal, now).await?;

        // Compare-and-swap on the denormalized counter; zero rows affected
        // means another transaction took the last remaining use.
        let affected = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(Expr::cust("usage_count < usage_limit"))
            .exec(txn)
            .await?
            .rows_affected;

        if affected == 0 {
            return Err(ServiceError::InvalidCoupon(CouponRejection::LimitExhausted));
        }

        let user_usages = CouponUsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::UserId.eq(user_id))
            .count(txn)
            .await?;
        if user_usages >= coupon.per_user_limit as u64 {
            return Err(ServiceError::InvalidCoupon(
                CouponRejection::PerUserLimitExhausted,
            ));
        }

        let discount = compute_discount(&coupon, subtotal);
        let usage = coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            discount_amount: Set(discount),
            created_at: Set(now),
        };
        usage.insert(txn).await?;

        info!(coupon_id = %coupon.id, order_id = %order_id, %discount, "coupon redeemed");
        self.event_sender.emit(Event::CouponRedeemed {
            coupon_id: coupon.id,
            order_id,
            discount_amount: discount,
        });

        Ok((coupon, discount))
    }
}

fn check_redeemable(
    coupon: &coupon::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::InvalidCoupon(CouponRejection::Inactive));
    }
    if now < coupon.starts_at {
        return Err(ServiceError::InvalidCoupon(CouponRejection::NotYetActive));
    }
    if now > coupon.expires_at {
        return Err(ServiceError::InvalidCoupon(CouponRejection::Expired));
    }
    if subtotal < coupon.minimum_order {
        return Err(ServiceError::InvalidCoupon(CouponRejection::BelowMinimum));
    }
    Ok(())
}

/// Discount for a subtotal, always a 2-fraction-digit amount never exceeding
/// the subtotal.
pub fn compute_discount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
    let raw = match coupon.discount_kind {
        DiscountKind::Percentage => (subtotal * coupon.discount_value / dec!(100)).round_dp(2),
        DiscountKind::Fixed => coupon.discount_value,
    };
    raw.min(subtotal)
}
