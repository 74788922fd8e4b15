use std::{future::Future, time::Duration};

use async_trait::async_trait;
use deadpool_redis::{redis, Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use tracing::{debug, info};

use super::{KeyValueStore, KvError, KvResult};

const POOL_SIZE: usize = 10;
const OP_TIMEOUT: Duration = Duration::from_secs(3);
const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisStore {
    /// Build the pool and verify the server answers `PING`.
    pub async fn connect(url: &str) -> KvResult<Self> {
        let mut cfg = Config::from_url(url);
        let mut pool_cfg = PoolConfig::new(POOL_SIZE);
        pool_cfg.timeouts = Timeouts {
            wait: Some(OP_TIMEOUT),
            create: Some(Duration::from_secs(5)),
            recycle: Some(OP_TIMEOUT),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| KvError::Pool(e.to_string()))?;

        let store = Self {
            pool,
            op_timeout: OP_TIMEOUT,
        };
        store.ping().await?;
        info!("connected to redis");
        Ok(store)
    }

    pub async fn ping(&self) -> KvResult<()> {
        let mut conn = self.conn().await?;
        self.bounded(async {
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
        })
        .await?;
        Ok(())
    }

    async fn conn(&self) -> KvResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| KvError::Pool(e.to_string()))
    }

    async fn bounded<T, F>(&self, fut: F) -> KvResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(|e| KvError::Command(e.to_string())),
            Err(_) => Err(KvError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn().await?;
        self.bounded(async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn().await?;
        self.bounded(async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        let mut conn = self.conn().await?;
        let secs: i64 = self
            .bounded(async {
                redis::cmd("TTL")
                    .arg(key)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        // -2: no key, -1: no expiry
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64> {
        let mut conn = self.conn().await?;
        let (count, _): (i64, i64) = self
            .bounded(async {
                redis::pipe()
                    .atomic()
                    .cmd("INCR")
                    .arg(key)
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl.as_secs().max(1))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(count)
    }

    async fn delete_matching(&self, pattern: &str) -> KvResult<u64> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(async {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = self
                    .bounded(async {
                        redis::cmd("DEL")
                            .arg(&keys)
                            .query_async::<_, u64>(&mut conn)
                            .await
                    })
                    .await?;
                debug!(pattern, ?keys, "deleted cache keys");
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".into())
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn incr_with_expiry_counts_and_sets_ttl() {
        let store = RedisStore::connect(&redis_url()).await.expect("redis up");
        let key = format!("rate_limit:test-{}", uuid::Uuid::new_v4());

        assert_eq!(store.incr_with_expiry(&key, Duration::from_secs(30)).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry(&key, Duration::from_secs(30)).await.unwrap(), 2);
        let ttl = store.ttl(&key).await.unwrap().expect("expiry set");
        assert!(ttl <= Duration::from_secs(30));

        store.delete_matching(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn delete_matching_only_touches_pattern() {
        let store = RedisStore::connect(&redis_url()).await.expect("redis up");
        let user = uuid::Uuid::new_v4();
        let other = uuid::Uuid::new_v4();
        for page in 1..=3 {
            let key = format!("tasks:{user}::{page}:10");
            store.set_ex(&key, "{}", Duration::from_secs(60)).await.unwrap();
        }
        let keep = format!("tasks:{other}::1:10");
        store.set_ex(&keep, "{}", Duration::from_secs(60)).await.unwrap();

        let removed = store.delete_matching(&format!("tasks:{user}:*")).await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.get(&keep).await.unwrap().is_some());

        store.delete_matching(&keep).await.unwrap();
    }
}
