use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

#[derive(Debug, Error)]
pub enum UserRepoError {
    #[error("duplicate {0:?}")]
    Duplicate(UniqueField),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type UserRepoResult<T> = Result<T, UserRepoError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; a unique-constraint hit comes back as `Duplicate`.
    async fn create(&self, user: NewUser) -> UserRepoResult<User>;

    async fn get_by_email(&self, email: &str) -> UserRepoResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> UserRepoResult<Option<User>>;

    async fn get_by_id(&self, id: Uuid) -> UserRepoResult<Option<User>>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: impl AsRef<str>) -> UserRepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT id, username, email, password, created_at, updated_at
            FROM users
            WHERE {column} = $1
            "#
        ))
        .bind(value.as_ref())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

fn classify_insert_error(err: sqlx::Error) -> UserRepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("users_email_key") => return UserRepoError::Duplicate(UniqueField::Email),
                Some("users_username_key") => {
                    return UserRepoError::Duplicate(UniqueField::Username)
                }
                _ => {}
            }
        }
    }
    UserRepoError::Database(err)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> UserRepoResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(classify_insert_error)
    }

    async fn get_by_email(&self, email: &str) -> UserRepoResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> UserRepoResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_id(&self, id: Uuid) -> UserRepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}
