use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{auth::repo_types::User, extract::required_text};

/// Request body for user registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(custom(function = "required_text"), length(min = 3, max = 100))]
    pub username: String,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "required_text"), email, length(max = 255))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "required_text"), length(min = 6))]
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(custom(function = "required_text"), email)]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "required_text"))]
    pub password: String,
}

/// Returned by register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
        }
    }
}

/// Surrounding whitespace is stripped before the email rule runs.
fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|s| s.trim().to_string())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
