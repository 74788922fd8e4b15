use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::tasks::repo_types::{NewTask, Task, TaskChanges, TaskStatus};

#[derive(Debug, Error)]
pub enum TaskRepoError {
    #[error("task not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type TaskRepoResult<T> = Result<T, TaskRepoError>;

/// Persistence for tasks. Every read and write is scoped by `user_id`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: NewTask) -> TaskRepoResult<Task>;

    async fn get(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<Option<Task>>;

    /// One page ordered newest first plus the total number of matching rows.
    async fn list(
        &self,
        user_id: Uuid,
        status: Option<TaskStatus>,
        page: u32,
        limit: u32,
    ) -> TaskRepoResult<(Vec<Task>, i64)>;

    /// Writes only the columns present in `changes`. `NotFound` when no row
    /// matches `(id, user_id)`.
    async fn update(&self, id: Uuid, user_id: Uuid, changes: TaskChanges) -> TaskRepoResult<Task>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<()>;
}

#[derive(Clone)]
pub struct PgTaskRepository {
    db: PgPool,
}

impl PgTaskRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const TASK_COLUMNS: &str = "id, title, description, status, user_id, created_at, updated_at";

pub(crate) fn page_offset(page: u32, limit: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(limit)
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create(&self, task: NewTask) -> TaskRepoResult<Task> {
        let row = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (id, title, description, status, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status)
        .bind(task.user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list(
        &self,
        user_id: Uuid,
        status: Option<TaskStatus>,
        page: u32,
        limit: u32,
    ) -> TaskRepoResult<(Vec<Task>, i64)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM tasks
            WHERE user_id = $1 AND ($2::task_status IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = $1 AND ($2::task_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(status)
        .bind(i64::from(limit))
        .bind(page_offset(page, limit))
        .fetch_all(&self.db)
        .await?;

        Ok((rows, total))
    }

    async fn update(&self, id: Uuid, user_id: Uuid, changes: TaskChanges) -> TaskRepoResult<Task> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tasks SET ");
        {
            let mut set = qb.separated(", ");
            // an empty change set still counts as a write
            set.push("updated_at = NOW()");
            if let Some(title) = changes.title {
                set.push("title = ").push_bind_unseparated(title);
            }
            if let Some(description) = changes.description {
                set.push("description = ").push_bind_unseparated(description);
            }
            if let Some(status) = changes.status {
                set.push("status = ").push_bind_unseparated(status);
            }
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(user_id)
            .push(" RETURNING ")
            .push(TASK_COLUMNS);

        qb.build_query_as::<Task>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(TaskRepoError::NotFound)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<()> {
        let result = sqlx::query(r#"DELETE FROM tasks WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TaskRepoError::NotFound);
        }
        Ok(())
    }
}
