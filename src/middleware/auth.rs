use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, JwtKeys, TokenError},
    error::AppError,
};

/// Requires `Authorization: Bearer <token>` and stores the caller's id in the
/// request extensions.
pub async fn require_auth(State(keys): State<JwtKeys>, mut req: Request, next: Next) -> Response {
    match authenticate(&keys, &req) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

fn authenticate(keys: &JwtKeys, req: &Request) -> Result<AuthUser, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("Authorization header is required".into()))?;

    let token = match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            token.trim()
        }
        _ => {
            return Err(AppError::Unauthorized(
                "Authorization header must be in the format: Bearer <token>".into(),
            ))
        }
    };

    let claims = keys.validate(token).map_err(|e| {
        match &e {
            TokenError::Expired => warn!("expired token"),
            TokenError::InvalidSignature => warn!("token signature mismatch"),
            other => warn!(error = %other, "malformed token"),
        }
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    let user_id = Uuid::parse_str(&claims.auth_id).map_err(|_| {
        warn!(auth_id = %claims.auth_id, "token subject is not a uuid");
        AppError::Unauthorized("Invalid user ID in token".into())
    })?;

    Ok(AuthUser(user_id))
}
