//! Key/value backing store shared by the list cache and the rate limiter.
//!
//! Every operation is fallible and callers treat failures as advisory: the
//! relational store stays authoritative.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv pool error: {0}")]
    Pool(String),
    #[error("kv command error: {0}")]
    Command(String),
    #[error("kv operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type KvResult<T> = Result<T, KvError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// Remaining time to live, `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>>;

    /// Increment a counter and (re)set its expiry in one round trip.
    /// Returns the counter value after the increment.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64>;

    /// Delete every key matching a glob pattern with a cursor scan.
    /// Returns the number of keys removed.
    async fn delete_matching(&self, pattern: &str) -> KvResult<u64>;
}
