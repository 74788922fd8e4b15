//! Request extractors that reject with the JSON error envelope.

use std::collections::BTreeMap;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

/// JSON body that is deserialized and then checked with `validator`.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await.map_err(|e| {
            debug!(error = %e, "rejected request body");
            AppError::BadRequest("Invalid JSON format".into())
        })?;

        data.validate()
            .map_err(|e| AppError::Validation(field_messages(&e)))?;

        Ok(ValidatedJson(data))
    }
}

/// `:id` path segment parsed as a UUID.
pub struct UuidPath(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UuidPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::InvalidTaskId)?;

        Uuid::parse_str(&raw)
            .map(UuidPath)
            .map_err(|_| AppError::InvalidTaskId)
    }
}

/// One user-facing message per invalid field.
pub fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let picked = errs
                .iter()
                .find(|e| e.code == "required")
                .or_else(|| errs.first())?;
            Some((field.to_string(), message_for(picked)))
        })
        .collect()
}

fn message_for(err: &ValidationError) -> String {
    let bound = |name: &str| err.params.get(name).and_then(|v| v.as_u64());
    match err.code.as_ref() {
        "required" => "This field is required".into(),
        "email" => "This field must be a valid email".into(),
        "oneof" => "This field must be one of: TO_DO IN_PROGRESS DONE".into(),
        "length" => {
            let len = err
                .params
                .get("value")
                .and_then(|v| v.as_str())
                .map(|s| s.chars().count() as u64);
            match (bound("min"), bound("max"), len) {
                (Some(min), _, Some(len)) if len < min => {
                    format!("This field must be at least {min} characters")
                }
                (_, Some(max), _) => format!("This field exceeds maximum length of {max}"),
                (Some(min), None, _) => format!("This field must be at least {min} characters"),
                _ => "This field is invalid".into(),
            }
        }
        _ => "This field is invalid".into(),
    }
}

/// Rejects empty or whitespace-only strings with the `required` code.
pub fn required_text(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}
