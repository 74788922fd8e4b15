use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{normalize_email, AuthResponse},
        jwt::{JwtKeys, TokenError},
        password::{PasswordError, PasswordHasher},
        repo::{UniqueField, UserRepoError, UserRepository},
        repo_types::NewUser,
    },
    error::AppError,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user with this email already exists")]
    EmailTaken,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("failed to hash password: {0}")]
    Password(#[from] PasswordError),
    #[error("failed to generate token: {0}")]
    Token(#[from] TokenError),
    #[error("user repository failed: {0}")]
    Repository(#[source] sqlx::Error),
}

impl From<UserRepoError> for AuthError {
    fn from(err: UserRepoError) -> Self {
        match err {
            UserRepoError::Duplicate(UniqueField::Email) => AuthError::EmailTaken,
            UserRepoError::Duplicate(UniqueField::Username) => AuthError::UsernameTaken,
            UserRepoError::Database(e) => AuthError::Repository(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailTaken | AuthError::UsernameTaken => AppError::BadRequest(err.to_string()),
            AuthError::InvalidCredentials => AppError::Unauthorized(err.to_string()),
            AuthError::Repository(e) => {
                error!(error = %e, "user repository error");
                AppError::Repository("Failed to process user".into())
            }
            AuthError::Password(_) | AuthError::Token(_) => {
                error!(error = %err, "auth internal error");
                AppError::Internal
            }
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    jwt: JwtKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher, jwt: JwtKeys) -> Self {
        Self { users, hasher, jwt }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, AuthError> {
        let username = username.trim();
        let email = normalize_email(email);

        if self.users.get_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(AuthError::EmailTaken);
        }
        if self.users.get_by_username(username).await?.is_some() {
            warn!(username, "username already taken");
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = self.hasher.hash(password).await?;
        // a concurrent registration can still trip the unique constraint
        let user = self
            .users
            .create(NewUser {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email,
                password_hash,
            })
            .await?;

        let token = self.jwt.generate(user.id)?;
        info!(user_id = %user.id, "user registered");
        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.users.get_by_email(&email).await? else {
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.jwt.generate(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }
}
