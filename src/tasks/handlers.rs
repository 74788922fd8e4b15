use axum::{
    extract::{Query, State},
    routing::{get, post},
    Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::AppError,
    extract::{UuidPath, ValidatedJson},
    response::ApiResponse,
    state::AppState,
    tasks::dto::{CreateTaskRequest, ListQuery, TaskResponse, TasksResponse, UpdateTaskRequest},
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route(
            "/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidatedJson(payload): ValidatedJson<CreateTaskRequest>,
) -> Result<ApiResponse<TaskResponse>, AppError> {
    let task = state.tasks.create(user_id, payload).await?;
    Ok(ApiResponse::created("Success create task", task))
}

#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<TasksResponse>, AppError> {
    let page = state.tasks.list(user_id, &query).await?;
    Ok(ApiResponse::ok("Success get tasks", page))
}

#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    UuidPath(id): UuidPath,
) -> Result<ApiResponse<TaskResponse>, AppError> {
    let task = state.tasks.get(user_id, id).await?;
    Ok(ApiResponse::ok("Success get task", task))
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    UuidPath(id): UuidPath,
    ValidatedJson(payload): ValidatedJson<UpdateTaskRequest>,
) -> Result<ApiResponse<TaskResponse>, AppError> {
    let task = state.tasks.update(user_id, id, payload).await?;
    Ok(ApiResponse::ok("Success update task", task))
}

#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    UuidPath(id): UuidPath,
) -> Result<ApiResponse<()>, AppError> {
    state.tasks.delete(user_id, id).await?;
    Ok(ApiResponse::message_only("Success delete task"))
}
