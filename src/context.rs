/// Application context and dependency injection
use crate::{
    account::UserManager,
    auth::{AuthGate, TokenService},
    config::ServerConfig,
    db::{self, SqliteStore},
    error::ApiResult,
    gadget::GadgetManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub store: Arc<SqliteStore>,
    pub tokens: Arc<TokenService>,
    pub auth_gate: Arc<AuthGate>,
    pub user_manager: Arc<UserManager>,
    pub gadget_manager: Arc<GadgetManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let pool = db::create_pool(&config.storage.database_path, options).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!(
            database = %config.storage.database_path.display(),
            "Database ready"
        );

        Ok(Self::from_pool(config, pool))
    }

    /// Wire services around an already-migrated pool
    pub fn from_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        let tokens = Arc::new(TokenService::new(
            config.authentication.jwt_secret.as_bytes(),
            config.authentication.token_ttl,
        ));

        let user_manager = Arc::new(UserManager::new(store.clone(), tokens.clone()));
        let auth_gate = Arc::new(AuthGate::new(tokens.clone(), user_manager.clone()));
        let gadget_manager = Arc::new(GadgetManager::new(store.clone(), &config.gadgets));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            db: pool,
            store,
            tokens,
            auth_gate,
            user_manager,
            gadget_manager,
            rate_limiter,
        }
    }
}
