//! Route definitions for task submission and inspection.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted directly under `/comfyfile`.
///
/// ```text
/// POST   /run           -> run (submit and wait)
/// POST   /run_async     -> run_async
/// GET    /task/{id}     -> get_task
/// DELETE /task/{id}     -> cancel_task
/// GET    /tasks         -> list_tasks
/// DELETE /tasks         -> cancel_all_tasks
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run", post(tasks::run))
        .route("/run_async", post(tasks::run_async))
        .route("/task/{id}", get(tasks::get_task).delete(tasks::cancel_task))
        .route("/tasks", get(tasks::list_tasks).delete(tasks::cancel_all_tasks))
}
