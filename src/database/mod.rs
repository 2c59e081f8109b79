use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{Plan, Project, StoredFile, User};

pub mod memory;
pub mod postgres;

pub use postgres::Database;

/// Transactional record store behind the core. Production runs on Postgres
/// (`postgres::Database`); tests run on the in-memory `memory::MemStore`.
/// All lookups by email, key hash, or (owner, project name) hit unique
/// constraints, so each returns at most one row.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // identities
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        api_key_hash: &str,
        plan_id: Uuid,
    ) -> Result<User>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>>;
    async fn update_account_key(&self, id: Uuid, key_hash: &str) -> Result<()>;
    async fn list_users(&self) -> Result<Vec<User>>;

    // quota counter
    /// Applies `delta` to `bytes_used`, clamping the result at zero.
    async fn adjust_bytes_used(&self, id: Uuid, delta: i64) -> Result<()>;
    async fn set_bytes_used(&self, id: Uuid, value: i64) -> Result<()>;
    /// True usage: sum of sizes of every file owned transitively via projects.
    async fn sum_file_sizes(&self, user_id: Uuid) -> Result<i64>;

    // plans
    async fn create_plan(&self, name: &str, byte_ceiling: i64) -> Result<Plan>;
    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>>;
    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>>;

    // projects
    async fn first_or_create_project(&self, user_id: Uuid, name: &str) -> Result<Project>;
    async fn find_project(&self, user_id: Uuid, name: &str) -> Result<Option<Project>>;
    async fn list_projects(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Project>>;
    async fn count_projects(&self, user_id: Uuid) -> Result<i64>;
    async fn delete_project(&self, id: Uuid) -> Result<()>;

    // files
    async fn create_file(
        &self,
        project_id: Uuid,
        name: &str,
        path: &str,
        size: i64,
        mime_type: &str,
    ) -> Result<StoredFile>;
    async fn find_file(&self, project_id: Uuid, name: &str) -> Result<Option<StoredFile>>;
    async fn list_files(&self, project_id: Uuid, limit: i64, offset: i64)
        -> Result<Vec<StoredFile>>;
    async fn count_files(&self, project_id: Uuid) -> Result<i64>;
    async fn sum_project_file_sizes(&self, project_id: Uuid) -> Result<i64>;
    async fn delete_file(&self, id: Uuid) -> Result<()>;
}
