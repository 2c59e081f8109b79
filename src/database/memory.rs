use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::database::RecordStore;
use crate::errors::{AppError, Result};
use crate::models::{Plan, Project, StoredFile, User};

/// In-memory record store. Mirrors the Postgres schema's unique constraints
/// so resolver and ledger behavior can be exercised without a live database.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    plans: HashMap<Uuid, Plan>,
    projects: HashMap<Uuid, Project>,
    files: HashMap<Uuid, StoredFile>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        api_key_hash: &str,
        plan_id: Uuid,
    ) -> Result<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.email == email) {
            return Err(AppError::Validation("email already registered".to_string()));
        }
        if inner.users.values().any(|u| u.api_key_hash == api_key_hash) {
            return Err(AppError::Validation("duplicate account key".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            api_key_hash: api_key_hash.to_string(),
            plan_id,
            bytes_used: 0,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .find(|u| u.api_key_hash == key_hash)
            .cloned())
    }

    async fn update_account_key(&self, id: Uuid, key_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.api_key_hash = key_hash.to_string();
                Ok(())
            }
            None => Err(AppError::NotFound("User")),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn adjust_bytes_used(&self, id: Uuid, delta: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.bytes_used = (user.bytes_used + delta).max(0);
                Ok(())
            }
            None => Err(AppError::NotFound("User")),
        }
    }

    async fn set_bytes_used(&self, id: Uuid, value: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.bytes_used = value.max(0);
                Ok(())
            }
            None => Err(AppError::NotFound("User")),
        }
    }

    async fn sum_file_sizes(&self, user_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        let total = inner
            .files
            .values()
            .filter(|f| {
                inner
                    .projects
                    .get(&f.project_id)
                    .is_some_and(|p| p.user_id == user_id)
            })
            .map(|f| f.size)
            .sum();
        Ok(total)
    }

    async fn create_plan(&self, name: &str, byte_ceiling: i64) -> Result<Plan> {
        let mut inner = self.inner.lock().unwrap();
        if inner.plans.values().any(|p| p.name == name) {
            return Err(AppError::Validation("plan name already exists".to_string()));
        }
        let plan = Plan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            byte_ceiling,
            created_at: Utc::now(),
        };
        inner.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        Ok(self.inner.lock().unwrap().plans.get(&id).cloned())
    }

    async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.plans.values().find(|p| p.name == name).cloned())
    }

    async fn first_or_create_project(&self, user_id: Uuid, name: &str) -> Result<Project> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .projects
            .values()
            .find(|p| p.user_id == user_id && p.name == name)
        {
            return Ok(existing.clone());
        }
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            user_id,
            created_at: Utc::now(),
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn find_project(&self, user_id: Uuid, name: &str) -> Result<Option<Project>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .projects
            .values()
            .find(|p| p.user_id == user_id && p.name == name)
            .cloned())
    }

    async fn list_projects(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Project>> {
        let inner = self.inner.lock().unwrap();
        let mut projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(projects
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_projects(&self, user_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.projects.values().filter(|p| p.user_id == user_id).count() as i64)
    }

    async fn delete_project(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.projects.remove(&id);
        inner.files.retain(|_, f| f.project_id != id);
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
        let mut inner = self.inner.lock().unwrap();
        let file = StoredFile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            path: path.to_string(),
            size,
            mime_type: mime_type.to_string(),
            project_id,
            uploaded_at: Utc::now(),
        };
        inner.files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn find_file(&self, project_id: Uuid, name: &str) -> Result<Option<StoredFile>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .values()
            .find(|f| f.project_id == project_id && f.name == name)
            .cloned())
    }

    async fn list_files(
        &self,
        project_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredFile>> {
        let inner = self.inner.lock().unwrap();
        let mut files: Vec<StoredFile> = inner
            .files
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.name.cmp(&b.name)));
        Ok(files
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_files(&self, project_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.files.values().filter(|f| f.project_id == project_id).count() as i64)
    }

    async fn sum_project_file_sizes(&self, project_id: Uuid) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .values()
            .filter(|f| f.project_id == project_id)
            .map(|f| f.size)
            .sum())
    }

    async fn delete_file(&self, id: Uuid) -> Result<()> {
        self.inner.lock().unwrap().files.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_email_enforced() {
        let store = MemStore::new();
        let plan = store.create_plan("Free", 1000).await.unwrap();
        store
            .create_user("a@example.com", "hash", "key1", plan.id)
            .await
            .unwrap();

        let dup = store.create_user("a@example.com", "hash", "key2", plan.id).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_first_or_create_project_is_idempotent() {
        let store = MemStore::new();
        let plan = store.create_plan("Free", 1000).await.unwrap();
        let user = store
            .create_user("a@example.com", "hash", "key", plan.id)
            .await
            .unwrap();

        let first = store.first_or_create_project(user.id, "docs").await.unwrap();
        let second = store.first_or_create_project(user.id, "docs").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count_projects(user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sum_file_sizes_spans_projects() {
        let store = MemStore::new();
        let plan = store.create_plan("Free", 1000).await.unwrap();
        let user = store
            .create_user("a@example.com", "hash", "key", plan.id)
            .await
            .unwrap();
        let p1 = store.first_or_create_project(user.id, "one").await.unwrap();
        let p2 = store.first_or_create_project(user.id, "two").await.unwrap();
        store.create_file(p1.id, "a", "a", 100, "image/png").await.unwrap();
        store.create_file(p2.id, "b", "b", 250, "image/png").await.unwrap();

        assert_eq!(store.sum_file_sizes(user.id).await.unwrap(), 350);
    }

    #[tokio::test]
    async fn test_adjust_bytes_used_floors_at_zero() {
        let store = MemStore::new();
        let plan = store.create_plan("Free", 1000).await.unwrap();
        let user = store
            .create_user("a@example.com", "hash", "key", plan.id)
            .await
            .unwrap();

        store.adjust_bytes_used(user.id, 50).await.unwrap();
        store.adjust_bytes_used(user.id, -80).await.unwrap();

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 0);
    }
}
