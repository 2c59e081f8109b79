use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    database::RecordStore,
    errors::{AppError, Result},
};

/// Tracks bytes-used per tenant and enforces the plan ceiling before an
/// upload is admitted.
///
/// The ceiling check reads the counter under a per-tenant mutex and the
/// returned [`Reservation`] keeps that mutex held until the matching commit,
/// so two concurrent uploads by the same tenant can never both pass the
/// check against the same stale counter. Different tenants use different
/// mutexes and never contend.
pub struct QuotaLedger {
    store: Arc<dyn RecordStore>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Admission for one pending upload. Holds the tenant's quota lock; dropping
/// it without committing leaves the counter untouched, which is what makes
/// aborted uploads (client disconnect, failed byte-sink write) free.
pub struct Reservation {
    user_id: Uuid,
    size: i64,
    _guard: OwnedMutexGuard<()>,
}

impl Reservation {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_default().clone()
    }

    /// Admits iff `bytes_used + size <= plan.byte_ceiling`, evaluated
    /// against a counter read taken after the tenant's lock is held.
    pub async fn reserve(&self, user_id: Uuid, size: i64) -> Result<Reservation> {
        let guard = self.lock_for(user_id).lock_owned().await;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;
        let plan = self
            .store
            .find_plan_by_id(user.plan_id)
            .await?
            .ok_or(AppError::NotFound("Plan"))?;

        let needed = user.bytes_used + size;
        if needed > plan.byte_ceiling {
            return Err(AppError::QuotaExceeded {
                needed,
                ceiling: plan.byte_ceiling,
            });
        }

        Ok(Reservation {
            user_id,
            size,
            _guard: guard,
        })
    }

    /// Advances the counter for a fully persisted file. A counter-update
    /// failure at this point is storage-accounting drift, not a request
    /// failure: the bytes and the file record are already durable, so the
    /// upload stands and reconciliation repairs the counter later.
    pub async fn commit_add(&self, reservation: Reservation) {
        if let Err(e) = self
            .store
            .adjust_bytes_used(reservation.user_id, reservation.size)
            .await
        {
            tracing::warn!(
                user_id = %reservation.user_id,
                delta = reservation.size,
                error = %e,
                "bytes_used update failed after durable write; drift until next reconciliation"
            );
        }
    }

    /// Decrements the counter for a deleted file, floored at zero. Unlike
    /// `commit_add` this propagates store failures: the caller has not yet
    /// reported the deletion complete.
    pub async fn commit_remove(&self, user_id: Uuid, size: i64) -> Result<()> {
        let _guard = self.lock_for(user_id).lock_owned().await;
        self.store.adjust_bytes_used(user_id, -size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemStore;
    use crate::models::{Plan, Project, StoredFile, User};
    use crate::services::Reconciler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to a `MemStore` but can be told to fail counter updates,
    /// standing in for a store outage that hits after the durable writes.
    struct FlakyStore {
        inner: MemStore,
        fail_adjust: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemStore::new(),
                fail_adjust: AtomicBool::new(false),
            }
        }

        fn fail_adjustments(&self, fail: bool) {
            self.fail_adjust.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn create_user(
            &self,
            email: &str,
            password_hash: &str,
            api_key_hash: &str,
            plan_id: Uuid,
        ) -> Result<User> {
            self.inner
                .create_user(email, password_hash, api_key_hash, plan_id)
                .await
        }

        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
            self.inner.find_user_by_id(id).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_key_hash(&self, key_hash: &str) -> Result<Option<User>> {
            self.inner.find_user_by_key_hash(key_hash).await
        }

        async fn update_account_key(&self, id: Uuid, key_hash: &str) -> Result<()> {
            self.inner.update_account_key(id, key_hash).await
        }

        async fn list_users(&self) -> Result<Vec<User>> {
            self.inner.list_users().await
        }

        async fn adjust_bytes_used(&self, id: Uuid, delta: i64) -> Result<()> {
            if self.fail_adjust.load(Ordering::SeqCst) {
                return Err(AppError::StoreUnavailable(sqlx::Error::PoolClosed));
            }
            self.inner.adjust_bytes_used(id, delta).await
        }

        async fn set_bytes_used(&self, id: Uuid, value: i64) -> Result<()> {
            self.inner.set_bytes_used(id, value).await
        }

        async fn sum_file_sizes(&self, user_id: Uuid) -> Result<i64> {
            self.inner.sum_file_sizes(user_id).await
        }

        async fn create_plan(&self, name: &str, byte_ceiling: i64) -> Result<Plan> {
            self.inner.create_plan(name, byte_ceiling).await
        }

        async fn find_plan_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
            self.inner.find_plan_by_id(id).await
        }

        async fn find_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
            self.inner.find_plan_by_name(name).await
        }

        async fn first_or_create_project(&self, user_id: Uuid, name: &str) -> Result<Project> {
            self.inner.first_or_create_project(user_id, name).await
        }

        async fn find_project(&self, user_id: Uuid, name: &str) -> Result<Option<Project>> {
            self.inner.find_project(user_id, name).await
        }

        async fn list_projects(
            &self,
            user_id: Uuid,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<Project>> {
            self.inner.list_projects(user_id, limit, offset).await
        }

        async fn count_projects(&self, user_id: Uuid) -> Result<i64> {
            self.inner.count_projects(user_id).await
        }

        async fn delete_project(&self, id: Uuid) -> Result<()> {
            self.inner.delete_project(id).await
        }

        async fn create_file(
            &self,
            project_id: Uuid,
            name: &str,
            path: &str,
            size: i64,
            mime_type: &str,
        ) -> Result<StoredFile> {
            self.inner
                .create_file(project_id, name, path, size, mime_type)
                .await
        }

        async fn find_file(&self, project_id: Uuid, name: &str) -> Result<Option<StoredFile>> {
            self.inner.find_file(project_id, name).await
        }

        async fn list_files(
            &self,
            project_id: Uuid,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<StoredFile>> {
            self.inner.list_files(project_id, limit, offset).await
        }

        async fn count_files(&self, project_id: Uuid) -> Result<i64> {
            self.inner.count_files(project_id).await
        }

        async fn sum_project_file_sizes(&self, project_id: Uuid) -> Result<i64> {
            self.inner.sum_project_file_sizes(project_id).await
        }

        async fn delete_file(&self, id: Uuid) -> Result<()> {
            self.inner.delete_file(id).await
        }
    }

    async fn setup(ceiling: i64) -> (Arc<QuotaLedger>, Arc<dyn RecordStore>, User) {
        let store: Arc<dyn RecordStore> = Arc::new(MemStore::new());
        let plan = store.create_plan("Free", ceiling).await.unwrap();
        let user = store
            .create_user("tenant@example.com", "hash", "keyhash", plan.id)
            .await
            .unwrap();
        (Arc::new(QuotaLedger::new(store.clone())), store, user)
    }

    #[tokio::test]
    async fn test_admits_exactly_to_the_ceiling() {
        let (ledger, _store, user) = setup(1000).await;

        let reservation = ledger.reserve(user.id, 1000).await.unwrap();
        ledger.commit_add(reservation).await;

        assert!(matches!(
            ledger.reserve(user.id, 1).await,
            Err(AppError::QuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_reserve_leaves_counter_unchanged() {
        let (ledger, store, user) = setup(1000).await;
        store.set_bytes_used(user.id, 950).await.unwrap();

        assert!(matches!(
            ledger.reserve(user.id, 100).await,
            Err(AppError::QuotaExceeded { needed: 1050, ceiling: 1000 })
        ));

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 950);
    }

    #[tokio::test]
    async fn test_dropped_reservation_has_no_effect() {
        let (ledger, store, user) = setup(1000).await;

        {
            let _reservation = ledger.reserve(user.id, 400).await.unwrap();
            // aborted upload: reservation dropped without commit
        }

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 0);

        // and the capacity is immediately available again
        assert!(ledger.reserve(user.id, 1000).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_floors_at_zero_under_double_delete() {
        let (ledger, store, user) = setup(1000).await;
        store.set_bytes_used(user.id, 100).await.unwrap();

        ledger.commit_remove(user.id, 100).await.unwrap();
        ledger.commit_remove(user.id, 100).await.unwrap();

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 0);
    }

    #[tokio::test]
    async fn test_concurrent_overshoot_admits_exactly_one() {
        let (ledger, store, user) = setup(1000).await;

        // Ten uploads of ceiling/10 + 1 bytes each: any two together overshoot.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            let user_id = user.id;
            handles.push(tokio::spawn(async move {
                match ledger.reserve(user_id, 101).await {
                    Ok(reservation) => {
                        ledger.commit_add(reservation).await;
                        true
                    }
                    Err(_) => false,
                }
            }));
        }

        let admitted = {
            let mut n = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    n += 1;
                }
            }
            n
        };

        // 101 * 9 = 909 <= 1000, so nine fit; the tenth would overshoot.
        assert_eq!(admitted, 9);
        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 909);
    }

    #[tokio::test]
    async fn test_concurrent_large_uploads_admit_exactly_one() {
        let (ledger, store, user) = setup(1000).await;

        // Each is over half the ceiling: exactly one can be admitted.
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = Arc::clone(&ledger);
            let user_id = user.id;
            handles.push(tokio::spawn(async move {
                match ledger.reserve(user_id, 501).await {
                    Ok(reservation) => {
                        ledger.commit_add(reservation).await;
                        true
                    }
                    Err(_) => false,
                }
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 1);
        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.bytes_used, 501);
    }

    #[tokio::test]
    async fn test_counter_failure_after_durable_write_is_drift_not_error() {
        let store = Arc::new(FlakyStore::new());
        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let plan = dyn_store.create_plan("Free", 10_000).await.unwrap();
        let user = dyn_store
            .create_user("tenant@example.com", "hash", "keyhash", plan.id)
            .await
            .unwrap();
        let project = dyn_store
            .first_or_create_project(user.id, "docs")
            .await
            .unwrap();
        let ledger = QuotaLedger::new(dyn_store.clone());

        // reserve and persist the file, then the counter update starts failing
        let reservation = ledger.reserve(user.id, 300).await.unwrap();
        dyn_store
            .create_file(project.id, "a.pdf", "p/a.pdf", 300, "application/pdf")
            .await
            .unwrap();
        store.fail_adjustments(true);
        ledger.commit_add(reservation).await;

        // the upload stands; the counter is stale
        let stale = dyn_store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stale.bytes_used, 0);

        // capacity checks use the stale value until reconciliation repairs it
        store.fail_adjustments(false);
        let corrections = Reconciler::new(dyn_store.clone()).run().await.unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].previous, 0);
        assert_eq!(corrections[0].actual, 300);

        let repaired = dyn_store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(repaired.bytes_used, 300);
    }

    #[tokio::test]
    async fn test_scenario_upload_delete_upload() {
        let (ledger, store, user) = setup(1000).await;
        store.set_bytes_used(user.id, 950).await.unwrap();

        // 100-byte upload rejected, counter untouched
        assert!(ledger.reserve(user.id, 100).await.is_err());
        assert_eq!(
            store.find_user_by_id(user.id).await.unwrap().unwrap().bytes_used,
            950
        );

        // deleting a 60-byte file frees room
        ledger.commit_remove(user.id, 60).await.unwrap();
        assert_eq!(
            store.find_user_by_id(user.id).await.unwrap().unwrap().bytes_used,
            890
        );

        // the same upload now goes through
        let reservation = ledger.reserve(user.id, 100).await.unwrap();
        ledger.commit_add(reservation).await;
        assert_eq!(
            store.find_user_by_id(user.id).await.unwrap().unwrap().bytes_used,
            990
        );
    }
}
