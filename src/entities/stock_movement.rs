use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only inventory ledger entry. For a given product, replaying all
/// movements in creation order must reproduce the current `stock` and
/// `reserved_stock` counters. Rows are never updated; the reaper prunes only
/// rows older than the retention window.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Signed quantity; sign convention is fixed per movement type.
    pub quantity: i32,
    pub stock_before: i32,
    pub stock_after: i32,
    pub reserved_before: i32,
    pub reserved_after: i32,
    #[sea_orm(nullable)]
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "restock")]
    Restock,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "reservation")]
    Reservation,
    #[sea_orm(string_value = "release")]
    Release,
}
