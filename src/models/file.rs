use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Size and path are immutable once created. Deleting a file must be
/// reflected in the owner's `bytes_used` before the deletion completes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub path: String,
    pub size: i64,
    pub mime_type: String,
    pub project_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
}
