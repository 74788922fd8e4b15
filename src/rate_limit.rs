//! Fixed-window request quota per client address.
//!
//! The shared backend counts in the key/value store so every server process
//! sees the same window. When the store is unreachable at boot the limiter
//! falls back to an in-process keyed token bucket, which only holds for a
//! single process.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota,
};
use time::OffsetDateTime;
use tracing::warn;

use crate::{config::RateLimitConfig, kv::KeyValueStore};

type LocalLimiter = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

const LOCAL_SHRINK_THRESHOLD: usize = 10_000;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota figures advertised to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub limit: u32,
    pub remaining: u32,
    /// Absolute unix time (seconds) at which the window resets.
    pub reset_at: i64,
}

impl Usage {
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(self.reset_at));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed(Usage),
    Limited(Usage),
    /// Backing store failed; the request is admitted without quota headers.
    Bypassed,
}

enum Backend {
    Shared(Arc<dyn KeyValueStore>),
    Local(LocalLimiter),
}

pub struct RateLimiter {
    backend: Backend,
    limit: u32,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn shared(store: Arc<dyn KeyValueStore>, cfg: &RateLimitConfig) -> Self {
        Self::with_backend(Backend::Shared(store), cfg)
    }

    pub fn local(cfg: &RateLimitConfig) -> Self {
        let burst = NonZeroU32::new(cfg.requests).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_secs(cfg.window_secs.max(1)) / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        let limiter =
            governor::RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>();
        Self::with_backend(Backend::Local(limiter), cfg)
    }

    fn with_backend(backend: Backend, cfg: &RateLimitConfig) -> Self {
        Self {
            backend,
            limit: cfg.requests,
            window: Duration::from_secs(cfg.window_secs),
            trust_proxy: cfg.trust_proxy,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.backend, Backend::Shared(_))
    }

    pub fn key(client: &str) -> String {
        format!("rate_limit:{client}")
    }

    pub async fn check(&self, client: &str) -> Decision {
        match &self.backend {
            Backend::Shared(store) => self.check_shared(store.as_ref(), client).await,
            Backend::Local(limiter) => self.check_local(limiter, client),
        }
    }

    async fn check_shared(&self, store: &dyn KeyValueStore, client: &str) -> Decision {
        let key = Self::key(client);
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let current = match store.get(&key).await {
            Ok(value) => value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0),
            Err(e) => {
                warn!(error = %e, client, "rate limit lookup failed; admitting request");
                return Decision::Bypassed;
            }
        };

        if current >= i64::from(self.limit) {
            let left = match store.ttl(&key).await {
                Ok(Some(ttl)) => ttl,
                _ => self.window,
            };
            return Decision::Limited(Usage {
                limit: self.limit,
                remaining: 0,
                reset_at: now + left.as_secs() as i64,
            });
        }

        match store.incr_with_expiry(&key, self.window).await {
            Ok(count) => Decision::Allowed(Usage {
                limit: self.limit,
                remaining: (i64::from(self.limit) - count).max(0) as u32,
                reset_at: now + self.window.as_secs() as i64,
            }),
            Err(e) => {
                warn!(error = %e, client, "rate limit increment failed; admitting request");
                Decision::Bypassed
            }
        }
    }

    fn check_local(&self, limiter: &LocalLimiter, client: &str) -> Decision {
        if limiter.len() > LOCAL_SHRINK_THRESHOLD {
            limiter.retain_recent();
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        match limiter.check_key(&client.to_string()) {
            Ok(snapshot) => Decision::Allowed(Usage {
                limit: self.limit,
                remaining: snapshot.remaining_burst_capacity(),
                reset_at: now + self.window.as_secs() as i64,
            }),
            Err(not_until) => {
                let wait = not_until.wait_time_from(limiter.clock().now());
                Decision::Limited(Usage {
                    limit: self.limit,
                    remaining: 0,
                    reset_at: now + wait.as_secs().max(1) as i64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvError, MemoryStore, MockKeyValueStore};

    fn cfg(requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests,
            window_secs: 60,
            trust_proxy: false,
        }
    }

    #[tokio::test]
    async fn shared_limiter_rejects_request_over_quota() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::shared(store.clone(), &cfg(3));

        let mut remaining = Vec::new();
        for _ in 0..3 {
            match limiter.check("10.0.0.1").await {
                Decision::Allowed(usage) => remaining.push(usage.remaining),
                other => panic!("expected allowed, got {other:?}"),
            }
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        match limiter.check("10.0.0.1").await {
            Decision::Limited(usage) => {
                assert_eq!(usage.remaining, 0);
                assert_eq!(usage.limit, 3);
                let now = OffsetDateTime::now_utc().unix_timestamp();
                assert!(usage.reset_at > now && usage.reset_at <= now + 60);
            }
            other => panic!("expected limited, got {other:?}"),
        }

        // other clients keep their own window
        assert!(matches!(limiter.check("10.0.0.2").await, Decision::Allowed(_)));
        assert_eq!(store.get("rate_limit:10.0.0.1").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn shared_limiter_fails_open_when_store_errors() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .returning(|_| Err(KvError::Command("connection refused".into())));
        store.expect_incr_with_expiry().never();

        let limiter = RateLimiter::shared(Arc::new(store), &cfg(1));
        assert_eq!(limiter.check("10.0.0.1").await, Decision::Bypassed);
    }

    #[tokio::test]
    async fn shared_limiter_fails_open_when_increment_errors() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_incr_with_expiry()
            .returning(|_, _| Err(KvError::Timeout(Duration::from_secs(3))));

        let limiter = RateLimiter::shared(Arc::new(store), &cfg(5));
        assert_eq!(limiter.check("10.0.0.1").await, Decision::Bypassed);
    }

    #[tokio::test]
    async fn local_limiter_enforces_burst() {
        let limiter = RateLimiter::local(&cfg(2));
        assert!(!limiter.is_shared());
        assert!(matches!(limiter.check("a").await, Decision::Allowed(_)));
        assert!(matches!(limiter.check("a").await, Decision::Allowed(_)));
        let now = OffsetDateTime::now_utc().unix_timestamp();
        match limiter.check("a").await {
            Decision::Limited(usage) => {
                assert_eq!(usage.remaining, 0);
                assert!(usage.reset_at > now);
                assert!(usage.reset_at <= now + limiter.window().as_secs() as i64 + 1);
            }
            other => panic!("expected limited, got {other:?}"),
        }
        assert!(matches!(limiter.check("b").await, Decision::Allowed(_)));
    }

    #[test]
    fn usage_sets_headers() {
        let mut headers = HeaderMap::new();
        Usage {
            limit: 3,
            remaining: 0,
            reset_at: 1_700_000_000,
        }
        .apply(&mut headers);
        assert_eq!(headers[LIMIT_HEADER], "3");
        assert_eq!(headers[REMAINING_HEADER], "0");
        assert_eq!(headers[RESET_HEADER], "1700000000");
    }
}
