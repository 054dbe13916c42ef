//! Handlers for task submission, waiting, and inspection.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use comfyfile_core::{BrokerError, Task, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for task listings.
const DEFAULT_LIST_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /comfyfile/run
///
/// Submit a workflow and block until it completes, fails, times out,
/// or the wait is cancelled. On success the backend's result payload
/// is returned verbatim inside the standard envelope. On timeout or
/// cancellation the task itself stays queued and keeps running.
pub async fn run(
    State(state): State<AppState>,
    Json(params): Json<serde_json::Value>,
) -> AppResult<Json<DataResponse<serde_json::Value>>> {
    let id = state.queue.submit(params).await?;
    let timeout = Duration::from_secs(state.config.result_timeout_secs);
    let result = state.bridge.await_result(&id, timeout).await?;
    Ok(Json(DataResponse::new(result)))
}

/// Payload returned by the async submission endpoint.
#[derive(Serialize)]
pub struct SubmittedTask {
    pub task_id: String,
}

/// POST /comfyfile/run_async
///
/// Submit a workflow without waiting. Returns 202 with the task ID;
/// the caller polls `GET /comfyfile/task/{id}` for the outcome.
pub async fn run_async(
    State(state): State<AppState>,
    Json(params): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let task_id = state.queue.submit(params).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse::new(SubmittedTask { task_id })),
    ))
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// GET /comfyfile/task/{id}
///
/// The persisted task record, or 404 if the ID is unknown.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Task>>> {
    let task = state
        .store
        .get_task(&id)
        .await?
        .ok_or(BrokerError::TaskNotFound(id))?;
    Ok(Json(DataResponse::new(task)))
}

/// Query parameters for the task listing.
#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Payload for the task listing.
#[derive(Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub count: usize,
}

/// GET /comfyfile/tasks?status&limit&offset
///
/// Newest-first listing, optionally filtered by status.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> AppResult<Json<DataResponse<TaskList>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let tasks = match query.status {
        Some(status) => state.store.list_tasks_by_status(status, limit).await?,
        None => state.store.list_tasks(limit, offset).await?,
    };
    let count = tasks.len();
    Ok(Json(DataResponse::new(TaskList { tasks, count })))
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Payload reporting a single-wait cancellation.
#[derive(Serialize)]
pub struct CancelOutcome {
    /// Whether a waiter was actually cancelled.
    pub cancelled: bool,
}

/// DELETE /comfyfile/task/{id}
///
/// Cancel the outstanding wait on a task. The task itself is not
/// removed from the queue and runs to completion; only the waiting
/// request is released.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<CancelOutcome>>> {
    let cancelled = state.bridge.cancel(&id);
    if cancelled {
        tracing::info!(task_id = %id, "Cancelled result wait");
    }
    Ok(Json(DataResponse::new(CancelOutcome { cancelled })))
}

/// Payload reporting a cancel-all sweep.
#[derive(Serialize)]
pub struct CancelAllOutcome {
    /// Number of waits that were cancelled.
    pub cancelled: usize,
}

/// DELETE /comfyfile/tasks
///
/// Cancel every outstanding wait at once.
pub async fn cancel_all_tasks(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CancelAllOutcome>>> {
    let cancelled = state.bridge.cancel_all();
    tracing::info!(cancelled, "Cancelled all result waits");
    Ok(Json(DataResponse::new(CancelAllOutcome { cancelled })))
}
