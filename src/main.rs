use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::sync::watch;

use taskhub::{
    app,
    config::AppConfig,
    db,
    kv::{KeyValueStore, RedisStore},
    state::AppState,
    tasks::ListCache,
    telemetry, worker,
};

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("load configuration")?;
    let _log_guard = telemetry::init(&config);

    if config.is_production() && config.jwt.secret.len() < MIN_PRODUCTION_SECRET_LEN {
        tracing::warn!(
            "JWT_SECRET is shorter than {} bytes in production",
            MIN_PRODUCTION_SECRET_LEN
        );
    }

    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    let redis_url = config.redis.url();
    let kv: Option<Arc<dyn KeyValueStore>> = match RedisStore::connect(&redis_url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "redis unavailable; list cache disabled and rate limiting is per-process"
            );
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = match (&kv, config.invalidation_worker) {
        (Some(store), true) => {
            let cache = ListCache::new(store.clone());
            Some(tokio::spawn(async move {
                if let Err(e) = worker::run(redis_url, cache, shutdown_rx).await {
                    tracing::error!(error = %e, "cache invalidation worker failed");
                }
            }))
        }
        (None, true) => {
            tracing::warn!("cache invalidation worker needs redis; not started");
            None
        }
        _ => None,
    };

    let state = AppState::init(config, pool.clone(), kv);
    tracing::info!(
        mode = if state.rate_limiter.is_shared() { "shared" } else { "local" },
        limit = state.rate_limiter.limit(),
        window_secs = state.rate_limiter.window().as_secs(),
        "rate limiter ready"
    );
    app::serve(app::build_app(state), addr, shutdown_tx).await?;

    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
