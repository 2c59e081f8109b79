use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::{CredentialResolver, TokenCodec},
    config::Config,
    database::RecordStore,
    services::{QuotaLedger, RateLimiter},
    storage::FileStore,
};

pub mod auth;
pub mod files;
pub mod health;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub files: Arc<dyn FileStore>,
    pub tokens: Arc<TokenCodec>,
    pub resolver: Arc<CredentialResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub ledger: Arc<QuotaLedger>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>, files: Arc<dyn FileStore>) -> Self {
        let tokens = Arc::new(TokenCodec::new(&config.jwt_secret));
        let resolver = Arc::new(CredentialResolver::new(tokens.clone(), store.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_capacity,
            Duration::from_secs(config.rate_limit_window_secs),
        ));
        let ledger = Arc::new(QuotaLedger::new(store.clone()));

        Self {
            config,
            store,
            files,
            tokens,
            resolver,
            rate_limiter,
            ledger,
        }
    }
}
