use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::database::RecordStore;
use crate::errors::Result;
use crate::models::{Plan, Project, StoredFile, User};

const USER_COLUMNS: &str = "id, email, password_hash, api_key_hash, plan_id, bytes_used, created_at";
const FILE_COLUMNS: &str = "id, name, path, size, mime_type, project_id, uploaded_at";

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::errors::AppError::Internal(e.into()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        api_key_hash: &str,
        plan_id: Uuid,
    ) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, password_hash, api_key_hash, plan_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(api_key_hash)
        .bind(plan_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE api_key_hash = $1"
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_account_key(&self, id: Uuid, key_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET api_key_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(key_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn adjust_bytes_used(&self, id: Uuid, delta: i64) -> Result<()> {
        sqlx::query("UPDATE users SET bytes_used = GREATEST(bytes_used + $2, 0) WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_bytes_used(&self, id: Uuid, value: i64) -> Result<()> {
        sqlx::query("UPDATE users SET bytes_used = GREATEST($2, 0) WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn sum_file_sizes(&self, user_id: Uuid) -> Result<i64> {
        // SUM(bigint) is NUMERIC in Postgres; cast back down for decoding.
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(f.size), 0)::BIGINT FROM files f \
             JOIN projects p ON f.project_id = p.id \
             WHERE p.user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn create_plan(&self, name: &str, byte_ceiling: i64) -> Result<Plan> {
        let plan = sqlx::query_as::<_, Plan>(
            "INSERT INTO plans (id, name, byte_ceiling) VALUES ($1, $2, $3) \
             RETURNING id, name, byte_ceiling, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(byte_ceiling)
        .fetch_one(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT id, name, byte_ceiling, created_at FROM plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT id, name, byte_ceiling, created_at FROM plans WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn first_or_create_project(&self, user_id: Uuid, name: &str) -> Result<Project> {
        // Races between concurrent uploads into a fresh project resolve via
        // the (user_id, name) unique constraint: the loser's insert is a
        // no-op and the follow-up select finds the winner's row.
        let inserted = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (id, name, user_id) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, name) DO NOTHING \
             RETURNING id, name, user_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(project) = inserted {
            return Ok(project);
        }

        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, user_id, created_at FROM projects WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    async fn find_project(&self, user_id: Uuid, name: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, user_id, created_at FROM projects WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    async fn list_projects(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT id, name, user_id, created_at FROM projects \
             WHERE user_id = $1 ORDER BY created_at LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }

    async fn count_projects(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_file(
        &self,
        project_id: Uuid,
        name: &str,
        path: &str,
        size: i64,
        mime_type: &str,
    ) -> Result<StoredFile> {
        let file = sqlx::query_as::<_, StoredFile>(&format!(
            "INSERT INTO files (id, name, path, size, mime_type, project_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(path)
        .bind(size)
        .bind(mime_type)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(file)
    }

    async fn find_file(&self, project_id: Uuid, name: &str) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE project_id = $1 AND name = $2"
        ))
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    async fn list_files(
        &self,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredFile>> {
        let files = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE project_id = $1 \
             ORDER BY uploaded_at LIMIT $2 OFFSET $3"
        ))
        .bind(project_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    async fn count_files(&self, project_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn sum_project_file_sizes(&self, project_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size), 0)::BIGINT FROM files WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn delete_file(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
