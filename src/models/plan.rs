use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable-after-creation quota template. Every identity is bound to
/// exactly one plan at creation time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub byte_ceiling: i64,
    pub created_at: DateTime<Utc>,
}

/// The plan every new identity is bound to. Must exist before registration.
pub const DEFAULT_PLAN: &str = "Free";
