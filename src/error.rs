use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred";

/// Error envelope returned for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: bool,
    pub status_code: u16,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Errors that reach the HTTP boundary. Messages are user-visible; details
/// belong in logs, not here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid task id")]
    InvalidTaskId,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request timed out")]
    Timeout,

    #[error("repository error: {0}")]
    Repository(String),

    #[error("internal error")]
    Internal,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::InvalidTaskId => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Repository(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidTaskId => "invalid_task_id",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited(_) => "rate_limit_exceeded",
            AppError::Timeout => "request_timeout",
            AppError::Repository(_) => "repository_error",
            AppError::Internal => "internal_server_error",
        }
    }

    pub fn into_body(self) -> ErrorBody {
        let status_code = self.status_code().as_u16();
        let error = self.code();
        let (message, errors) = match self {
            AppError::Validation(fields) => ("Validation failed".to_string(), Some(fields)),
            AppError::InvalidTaskId => ("Invalid task ID format".to_string(), None),
            AppError::Timeout => ("Request timed out".to_string(), None),
            AppError::Internal => (INTERNAL_ERROR_MESSAGE.to_string(), None),
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::RateLimited(msg)
            | AppError::Repository(msg) => (msg, None),
        };
        ErrorBody {
            status: false,
            status_code,
            error,
            message,
            errors,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.into_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_field_map() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "This field is required".to_string());
        let body = AppError::Validation(fields).into_body();

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], false);
        assert_eq!(json["status_code"], 400);
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["errors"]["title"], "This field is required");
    }

    #[test]
    fn internal_error_hides_details() {
        let json = serde_json::to_value(AppError::Internal.into_body()).unwrap();
        assert_eq!(json["status_code"], 500);
        assert_eq!(json["message"], INTERNAL_ERROR_MESSAGE);
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError::NotFound("task not found".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
