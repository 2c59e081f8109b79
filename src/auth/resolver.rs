use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::{AccountKeyService, TokenCodec},
    database::RecordStore,
    errors::{AppError, Result},
    models::User,
};

/// Outcome of one resolution strategy. `NoMatch` means "try the next
/// strategy"; a store failure aborts resolution entirely.
enum Resolution {
    Resolved(User),
    NoMatch,
}

/// Maps one opaque bearer string to a tenant identity.
///
/// Strategies run in a fixed priority order, first success wins: a valid
/// session token is preferred over an account key. Both lookups hit unique
/// columns, so at most one identity can ever match.
pub struct CredentialResolver {
    codec: Arc<TokenCodec>,
    store: Arc<dyn RecordStore>,
}

impl CredentialResolver {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn RecordStore>) -> Self {
        Self { codec, store }
    }

    pub async fn resolve(&self, credential: &str) -> Result<User> {
        if let Resolution::Resolved(user) = self.via_session_token(credential).await? {
            return Ok(user);
        }
        if let Resolution::Resolved(user) = self.via_account_key(credential).await? {
            return Ok(user);
        }
        Err(AppError::Unauthenticated)
    }

    async fn via_session_token(&self, credential: &str) -> Result<Resolution> {
        let claims = match self.codec.verify(credential) {
            Ok(claims) => claims,
            Err(_) => return Ok(Resolution::NoMatch),
        };
        let user_id = match Uuid::parse_str(&claims.sub) {
            Ok(id) => id,
            Err(_) => return Ok(Resolution::NoMatch),
        };
        match self.store.find_user_by_id(user_id).await? {
            Some(user) => Ok(Resolution::Resolved(user)),
            None => Ok(Resolution::NoMatch),
        }
    }

    async fn via_account_key(&self, credential: &str) -> Result<Resolution> {
        if AccountKeyService::validate_format(credential).is_err() {
            return Ok(Resolution::NoMatch);
        }
        let key_hash = AccountKeyService::hash(credential);
        match self.store.find_user_by_key_hash(&key_hash).await? {
            Some(user) => Ok(Resolution::Resolved(user)),
            None => Ok(Resolution::NoMatch),
        }
    }

    /// Replaces the stored key hash atomically. The old key stops resolving
    /// the moment the update lands; there is no grace period. The returned
    /// plaintext is the only copy that will ever exist.
    pub async fn rotate_key(&self, user_id: Uuid) -> Result<String> {
        let new_key = AccountKeyService::generate();
        self.store
            .update_account_key(user_id, &AccountKeyService::hash(&new_key))
            .await?;
        Ok(new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemStore;

    async fn setup() -> (CredentialResolver, Arc<dyn RecordStore>, User, String) {
        let store: Arc<dyn RecordStore> = Arc::new(MemStore::new());
        let plan = store.create_plan("Free", 1000).await.unwrap();
        let key = AccountKeyService::generate();
        let user = store
            .create_user(
                "tenant@example.com",
                "$2b$12$fakehash",
                &AccountKeyService::hash(&key),
                plan.id,
            )
            .await
            .unwrap();
        let codec = Arc::new(TokenCodec::new("resolver-secret"));
        let resolver = CredentialResolver::new(codec, store.clone());
        (resolver, store, user, key)
    }

    #[tokio::test]
    async fn test_resolves_session_token() {
        let (resolver, _store, user, _key) = setup().await;
        let codec = TokenCodec::new("resolver-secret");
        let token = codec.issue(user.id, &user.email).unwrap();

        let resolved = resolver.resolve(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_resolves_account_key() {
        let (resolver, _store, user, key) = setup().await;

        let resolved = resolver.resolve(&key).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_rejects_unknown_credential() {
        let (resolver, _store, _user, _key) = setup().await;

        let err = resolver.resolve("fk_unknownunknownunknownunknown12").await;
        assert!(matches!(err, Err(AppError::Unauthenticated)));

        let err = resolver.resolve("garbage").await;
        assert!(matches!(err, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_token_for_deleted_identity_falls_through() {
        let (resolver, _store, _user, _key) = setup().await;
        let codec = TokenCodec::new("resolver-secret");
        let token = codec.issue(Uuid::new_v4(), "ghost@example.com").unwrap();

        let err = resolver.resolve(&token).await;
        assert!(matches!(err, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_key_immediately() {
        let (resolver, _store, user, old_key) = setup().await;

        let new_key = resolver.rotate_key(user.id).await.unwrap();
        assert_ne!(new_key, old_key);

        let err = resolver.resolve(&old_key).await;
        assert!(matches!(err, Err(AppError::Unauthenticated)));

        let resolved = resolver.resolve(&new_key).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }
}
