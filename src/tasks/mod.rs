use crate::state::AppState;
use axum::Router;

pub mod cache;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use cache::ListCache;
pub use services::{TaskError, TaskService};

/// Task routes; callers must wrap them in the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::task_routes())
}
