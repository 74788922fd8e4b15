use axum::{extract::State, routing::post, Router};
use tracing::instrument;

use crate::{
    auth::dto::{AuthResponse, LoginRequest, RegisterRequest},
    error::AppError,
    extract::ValidatedJson,
    response::ApiResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let resp = state
        .auth
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok(ApiResponse::created("Success register user", resp))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>, AppError> {
    let resp = state.auth.login(&payload.email, &payload.password).await?;
    Ok(ApiResponse::ok("Success login user", resp))
}
