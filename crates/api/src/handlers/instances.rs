//! Handlers for backend instance administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use comfyfile_core::{InstanceConfig, InstanceView};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /comfyfile/instances
///
/// All registered instances with health and busy state. Auth tokens
/// are never included.
pub async fn list_instances(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<InstanceView>>>> {
    Ok(Json(DataResponse::new(state.registry.list().await)))
}

/// POST /comfyfile/instances
///
/// Register a new instance (or refresh the token of a known URL). The
/// instance starts with unknown health and becomes eligible for
/// dispatch after the next sweep probes it.
pub async fn add_instance(
    State(state): State<AppState>,
    Json(config): Json<InstanceConfig>,
) -> AppResult<impl IntoResponse> {
    if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
        return Err(AppError::BadRequest(format!(
            "Instance URL must be http(s), got {:?}",
            config.url
        )));
    }
    let url = config.url.trim_end_matches('/').to_string();
    state
        .registry
        .add(InstanceConfig {
            url: url.clone(),
            token: config.token,
        })
        .await;
    tracing::info!(url = %url, "Instance registered");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(RegisteredInstance { url })),
    ))
}

/// Payload returned after registering an instance.
#[derive(Serialize)]
pub struct RegisteredInstance {
    pub url: String,
}

/// DELETE /comfyfile/instances/{url}
///
/// Deregister an instance. The URL path segment is percent-encoded by
/// the caller. Refused with 400 while the instance is executing a
/// task; 404 if the URL is unknown.
pub async fn remove_instance(
    State(state): State<AppState>,
    Path(url): Path<String>,
) -> AppResult<Json<DataResponse<RegisteredInstance>>> {
    state.registry.remove(&url).await?;
    tracing::info!(url = %url, "Instance deregistered");
    Ok(Json(DataResponse::new(RegisteredInstance { url })))
}
