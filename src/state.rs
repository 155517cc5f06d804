use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::db::SqliteStore;
use crate::rate_limit::RateLimiter;
use crate::services::RegistrationEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: RegistrationEngine,
    pub tokens: TokenKeys,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the engine, token keys and limiter around an open pool.
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        let engine = RegistrationEngine::new(store, config.store_timeout);
        let tokens = TokenKeys::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_enabled));

        Self {
            db,
            engine,
            tokens,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}
