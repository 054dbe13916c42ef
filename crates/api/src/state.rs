use std::sync::Arc;

use comfyfile_broker::{InstanceRegistry, ResultBridge, TaskQueue};
use comfyfile_store::TaskStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable (everything is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (read by the auth middleware and the wait
    /// handlers).
    pub config: Arc<ServerConfig>,
    /// Durable task store.
    pub store: Arc<dyn TaskStore>,
    /// Registry of backend instances.
    pub registry: Arc<InstanceRegistry>,
    /// Submission side of the broker.
    pub queue: Arc<TaskQueue>,
    /// Result waits with timeout/cancellation.
    pub bridge: Arc<ResultBridge>,
    /// Shared HTTP client, used by the proxy fallback.
    pub http: reqwest::Client,
}
