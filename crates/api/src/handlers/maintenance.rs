//! Maintenance operations on the task store.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for the purge endpoint.
#[derive(Deserialize)]
pub struct PurgeRequest {
    /// Terminal records older than this many days are removed.
    pub days: i64,
}

/// Payload reporting a purge run.
#[derive(Serialize)]
pub struct PurgeOutcome {
    pub removed: usize,
}

/// POST /comfyfile/maintenance/purge
///
/// Delete completed and failed task records older than the cutoff.
/// Pending and processing records are never touched.
pub async fn purge(
    State(state): State<AppState>,
    Json(request): Json<PurgeRequest>,
) -> AppResult<Json<DataResponse<PurgeOutcome>>> {
    if request.days < 0 {
        return Err(AppError::BadRequest(
            "days must be zero or positive".into(),
        ));
    }
    let removed = state.store.purge_older_than(request.days).await?;
    tracing::info!(days = request.days, removed, "Purged old task records");
    Ok(Json(DataResponse::new(PurgeOutcome { removed })))
}
