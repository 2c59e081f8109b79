use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered tenant. Owns projects transitively owning files; carries the
/// cached `bytes_used` counter the quota ledger maintains.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// SHA-256 of the current account key. The plaintext key is returned
    /// exactly once at registration or rotation and is unrecoverable after.
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub plan_id: Uuid,
    pub bytes_used: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserStatusResponse {
    pub id: Uuid,
    pub email: String,
    pub plan: String,
    pub byte_ceiling: i64,
    pub bytes_used: i64,
    pub remaining_bytes: i64,
}
