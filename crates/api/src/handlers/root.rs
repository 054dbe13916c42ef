//! Service index and liveness endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// Payload for the service index.
#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the task store is reachable.
    pub store_healthy: bool,
    /// Requests currently blocked on a task result.
    pub active_waiters: usize,
}

/// GET / -- service name and version.
pub async fn index() -> Json<DataResponse<ServiceInfo>> {
    Json(DataResponse::new(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: "Comfyfile task broker middleware",
    }))
}

/// GET /health -- middleware and store health.
pub async fn health(State(state): State<AppState>) -> Json<DataResponse<HealthResponse>> {
    let store_healthy = state.store.ping().await.is_ok();
    let status = if store_healthy { "ok" } else { "degraded" };

    Json(DataResponse::new(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        active_waiters: state.bridge.active_waiters(),
    }))
}
