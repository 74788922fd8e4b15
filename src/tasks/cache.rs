//! Read-through cache in front of the task list query.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    kv::{KeyValueStore, KvError},
    tasks::{dto::TasksResponse, repo_types::TaskStatus},
};

pub const LIST_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] KvError),
    #[error("cached value is not a task page: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ListCache {
    store: Option<Arc<dyn KeyValueStore>>,
    ttl: Duration,
}

impl ListCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ttl: LIST_TTL,
        }
    }

    /// Cache that never hits; used when the key/value store is unavailable.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: LIST_TTL,
        }
    }

    pub fn key(user_id: Uuid, status: Option<TaskStatus>, page: u32, limit: u32) -> String {
        let status = status.map(|s| s.as_str()).unwrap_or("");
        format!("tasks:{user_id}:{status}:{page}:{limit}")
    }

    pub fn user_pattern(user_id: Uuid) -> String {
        format!("tasks:{user_id}:*")
    }

    pub async fn get(&self, key: &str) -> Result<Option<TasksResponse>, CacheError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, page: &TasksResponse) -> Result<(), CacheError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let raw = serde_json::to_string(page)?;
        store.set_ex(key, &raw, self.ttl).await?;
        Ok(())
    }

    /// Drop every cached page belonging to `user_id`.
    pub async fn invalidate(&self, user_id: Uuid) -> Result<u64, CacheError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let removed = store.delete_matching(&Self::user_pattern(user_id)).await?;
        debug!(%user_id, removed, "invalidated task list cache");
        Ok(removed)
    }
}
