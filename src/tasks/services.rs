use std::sync::Arc;

use thiserror::Error;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    tasks::{
        cache::ListCache,
        dto::{total_pages, CreateTaskRequest, ListQuery, TaskResponse, TasksResponse, UpdateTaskRequest},
        repo::{TaskRepoError, TaskRepository},
        repo_types::{NewTask, TaskChanges, TaskStatus, UnknownStatus},
    },
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error(transparent)]
    InvalidStatus(#[from] UnknownStatus),
    #[error("task repository failed: {0}")]
    Repository(#[source] sqlx::Error),
}

impl From<TaskRepoError> for TaskError {
    fn from(err: TaskRepoError) -> Self {
        match err {
            TaskRepoError::NotFound => TaskError::NotFound,
            TaskRepoError::Database(e) => TaskError::Repository(e),
        }
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound => AppError::NotFound("Task not found".into()),
            TaskError::InvalidStatus(e) => AppError::BadRequest(e.to_string()),
            TaskError::Repository(e) => {
                error!(error = %e, "task repository error");
                AppError::Repository("Failed to process task".into())
            }
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Task use cases. `user_id` always comes from the authenticated request.
#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
    cache: ListCache,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>, cache: ListCache) -> Self {
        Self { repo, cache }
    }

    #[instrument(skip(self, req), fields(%user_id))]
    pub async fn create(&self, user_id: Uuid, req: CreateTaskRequest) -> TaskResult<TaskResponse> {
        let task = self
            .repo
            .create(NewTask {
                id: Uuid::new_v4(),
                title: req.title.trim().to_string(),
                description: req.description,
                status: TaskStatus::default(),
                user_id,
            })
            .await?;
        self.invalidate(user_id).await;
        Ok(task.into())
    }

    #[instrument(skip(self), fields(%user_id, %id))]
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> TaskResult<TaskResponse> {
        self.repo
            .get(id, user_id)
            .await?
            .map(Into::into)
            .ok_or(TaskError::NotFound)
    }

    #[instrument(skip(self, query), fields(%user_id))]
    pub async fn list(&self, user_id: Uuid, query: &ListQuery) -> TaskResult<TasksResponse> {
        let status = query.status().map(str::parse::<TaskStatus>).transpose()?;
        let (page, limit) = (query.page(), query.limit());
        let key = ListCache::key(user_id, status, page, limit);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => warn!(error = %e, key, "task list cache read failed"),
        }

        let (rows, total) = self.repo.list(user_id, status, page, limit).await?;
        let response = TasksResponse {
            tasks: rows.into_iter().map(Into::into).collect(),
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        };

        if let Err(e) = self.cache.set(&key, &response).await {
            warn!(error = %e, key, "task list cache write failed");
        }
        Ok(response)
    }

    #[instrument(skip(self, req), fields(%user_id, %id))]
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        req: UpdateTaskRequest,
    ) -> TaskResult<TaskResponse> {
        let status = req.status.as_deref().map(str::parse::<TaskStatus>).transpose()?;
        if self.repo.get(id, user_id).await?.is_none() {
            return Err(TaskError::NotFound);
        }

        let changes = TaskChanges {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            status,
        };
        let task = self.repo.update(id, user_id, changes).await?;
        self.invalidate(user_id).await;
        Ok(task.into())
    }

    #[instrument(skip(self), fields(%user_id, %id))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> TaskResult<()> {
        self.repo.delete(id, user_id).await?;
        self.invalidate(user_id).await;
        Ok(())
    }

    async fn invalidate(&self, user_id: Uuid) {
        if let Err(e) = self.cache.invalidate(user_id).await {
            warn!(error = %e, %user_id, "task list cache invalidation failed");
        }
    }
}
