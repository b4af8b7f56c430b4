use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of every processor event received. `provider_event_id` is
/// globally unique; a second delivery of the same id is a no-op. The row is
/// inserted first inside the reconciliation transaction so the idempotency
/// gate and the business effect commit or roll back together.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub provider_event_id: String,
    pub event_type: String,
    /// Hex SHA-256 of the raw payload, kept for audit rather than replay.
    pub payload_digest: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
