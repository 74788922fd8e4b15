use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{
        password::PasswordHasher,
        repo::{PgUserRepository, UserRepository},
        AuthService, JwtKeys,
    },
    config::AppConfig,
    kv::KeyValueStore,
    rate_limit::RateLimiter,
    tasks::{
        repo::{PgTaskRepository, TaskRepository},
        ListCache, TaskService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub tasks: TaskService,
    pub jwt: JwtKeys,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Production wiring over Postgres. Without a key/value store the list
    /// cache is disabled and the rate limiter runs in-process.
    pub fn init(config: AppConfig, db: PgPool, kv: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self::from_parts(
            config,
            Arc::new(PgUserRepository::new(db.clone())),
            Arc::new(PgTaskRepository::new(db)),
            kv,
        )
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        tasks: Arc<dyn TaskRepository>,
        kv: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let jwt = JwtKeys::new(&config.jwt);
        let (cache, rate_limiter) = match kv {
            Some(store) => (
                ListCache::new(store.clone()),
                RateLimiter::shared(store, &config.rate_limit),
            ),
            None => (ListCache::disabled(), RateLimiter::local(&config.rate_limit)),
        };

        Self {
            auth: AuthService::new(users, PasswordHasher::new(config.bcrypt_cost), jwt.clone()),
            tasks: TaskService::new(tasks, cache),
            jwt,
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
        }
    }
}
