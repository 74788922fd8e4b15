use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{KeyValueStore, KvError, KvResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Single-process store with the same semantics as the Redis backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| {
            let now = Instant::now();
            entries.values().filter(|e| e.is_live(now)).count()
        })
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> KvResult<T> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| KvError::Command("memory store lock poisoned".into()))?;
        let now = Instant::now();
        guard.retain(|_, e| e.is_live(now));
        Ok(f(&mut guard))
    }
}

/// Glob matching for the subset of patterns the service issues (`*` and `?`).
fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    let (mut pi, mut ki) = (0, 0);
    let (mut star, mut mark) = (None, 0);
    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ki;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ki = mark;
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.with_entries(|entries| entries.get(key).map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        })
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        self.with_entries(|entries| {
            entries
                .get(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(Instant::now()))
        })
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> KvResult<i64> {
        self.with_entries(|entries| {
            let current = entries
                .get(key)
                .and_then(|e| e.value.parse::<i64>().ok())
                .unwrap_or(0);
            let next = current + 1;
            entries.insert(
                key.to_string(),
                Entry {
                    value: next.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            next
        })
    }

    async fn delete_matching(&self, pattern: &str) -> KvResult<u64> {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|k, _| !glob_match(pattern, k));
            (before - entries.len()) as u64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_prefix_patterns() {
        assert!(glob_match("tasks:abc:*", "tasks:abc::1:10"));
        assert!(glob_match("tasks:abc:*", "tasks:abc:DONE:2:5"));
        assert!(!glob_match("tasks:abc:*", "tasks:abd::1:10"));
        assert!(!glob_match("tasks:abc:*", "rate_limit:1.2.3.4"));
        assert!(glob_match("rate_limit:?.?", "rate_limit:1.2"));
    }

    #[tokio::test]
    async fn incr_starts_at_one_and_counts() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("k", ttl).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
        assert!(store.ttl("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entries_disappear() {
        let store = MemoryStore::new();
        store
            .set_ex("gone", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("gone").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_matching_removes_only_matches() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_ex("tasks:u1::1:10", "a", ttl).await.unwrap();
        store.set_ex("tasks:u1:DONE:1:10", "b", ttl).await.unwrap();
        store.set_ex("tasks:u2::1:10", "c", ttl).await.unwrap();

        assert_eq!(store.delete_matching("tasks:u1:*").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("tasks:u2::1:10").await.unwrap().is_some());
    }
}
