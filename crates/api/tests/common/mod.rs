//! Shared helpers for the API integration tests.
//!
//! Builds the full application router over a [`MemoryStore`] with the
//! same middleware stack production uses, plus small request/response
//! helpers around `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use comfyfile_api::config::ServerConfig;
use comfyfile_api::router::build_app_router;
use comfyfile_api::state::AppState;
use comfyfile_broker::{ComfyfileClient, Dispatcher, InstanceRegistry, ResultBridge, TaskQueue};
use comfyfile_core::InstanceConfig;
use comfyfile_store::{MemoryStore, TaskStore};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults: security off, no
/// instances, and a short result wait so timeout paths finish fast.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        redis_url: "redis://unused".to_string(),
        health_check_interval_secs: 3600,
        probe_timeout_secs: 1,
        result_timeout_secs: 1,
        security_enabled: false,
        security_secret: None,
        instances: Vec::new(),
    }
}

/// A fully wired application over a [`MemoryStore`], with the
/// dispatcher running in the background.
pub struct TestApp {
    pub app: Router,
    pub store: MemoryStore,
    pub registry: Arc<InstanceRegistry>,
    cancel: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the application the way `main.rs` does, minus Redis.
pub fn build_test_app(config: ServerConfig) -> TestApp {
    let store = MemoryStore::new();
    let store_dyn: Arc<dyn TaskStore> = Arc::new(store.clone());
    let registry = Arc::new(InstanceRegistry::new(config.instances.clone()));
    let http = reqwest::Client::new();
    let client = ComfyfileClient::with_client(http.clone());

    let (dispatcher, dispatch) =
        Dispatcher::new(store_dyn.clone(), registry.clone(), client);
    let cancel = CancellationToken::new();
    tokio::spawn(dispatcher.run(cancel.clone()));

    let state = AppState {
        config: Arc::new(config),
        store: store_dyn.clone(),
        registry: registry.clone(),
        queue: Arc::new(TaskQueue::new(store_dyn.clone(), dispatch)),
        bridge: Arc::new(ResultBridge::new(store_dyn)),
        http,
    };

    TestApp {
        app: build_app_router(state),
        store,
        registry,
        cancel,
    }
}

/// Default app: security off, no instances.
pub fn default_app() -> TestApp {
    build_test_app(test_config())
}

/// Mark every configured instance healthy so dispatch can proceed
/// without running a real health sweep.
pub async fn mark_all_healthy(registry: &InstanceRegistry) {
    let targets = registry.probe_targets().await;
    let results: Vec<(String, bool)> = targets.into_iter().map(|(url, _)| (url, true)).collect();
    registry.apply_sweep(&results, chrono::Utc::now()).await;
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds"),
    )
    .await
    .expect("request succeeds")
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds"),
    )
    .await
    .expect("request succeeds")
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .expect("request builds"),
    )
    .await
    .expect("request succeeds")
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Allow a short grace period for e.g. request-scoped helpers; kept
/// here so individual tests do not hand-roll sleeps.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
