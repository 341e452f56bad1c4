use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RankingEntry {
    pub id: Uuid,
    pub ranking_id: Uuid,
    pub user_id: Uuid,
    pub attempt_id: Uuid,
    pub position: i32,
    pub score: Decimal,
    pub created_at: DateTime<Utc>,
}
