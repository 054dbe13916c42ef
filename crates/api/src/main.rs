use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfyfile_api::config::ServerConfig;
use comfyfile_api::router::build_app_router;
use comfyfile_api::state::AppState;
use comfyfile_broker::{ComfyfileClient, Dispatcher, HealthChecker, InstanceRegistry, ResultBridge, TaskQueue};
use comfyfile_store::{RedisStore, TaskStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comfyfile_api=debug,comfyfile_broker=debug,comfyfile_store=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        instances = config.instances.len(),
        "Loaded server configuration",
    );

    // --- Task store ---
    let store: Arc<dyn TaskStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .expect("Failed to connect to Redis"),
    );
    tracing::info!("Task store connected");

    // --- Broker ---
    let registry = Arc::new(InstanceRegistry::new(config.instances.clone()));
    let http = reqwest::Client::new();
    let client = ComfyfileClient::with_client(http.clone());

    let (dispatcher, dispatch) = Dispatcher::new(store.clone(), registry.clone(), client.clone());
    let shutdown = CancellationToken::new();
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown.clone()));

    let checker = HealthChecker::new(
        registry.clone(),
        client,
        dispatch.clone(),
        Duration::from_secs(config.health_check_interval_secs),
        Duration::from_secs(config.probe_timeout_secs),
    );
    let checker_handle = tokio::spawn(checker.run(shutdown.clone()));

    // Wake the dispatcher once at startup: tasks left in the durable
    // queue by a previous run must not wait for a new submission.
    dispatch.trigger();

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        registry,
        queue: Arc::new(TaskQueue::new(store.clone(), dispatch)),
        bridge: Arc::new(ResultBridge::new(store)),
        http,
    };

    // --- Router ---
    let app = build_app_router(state);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST/PORT combination");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(%addr, "Comfyfile broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // --- Drain background tasks ---
    shutdown.cancel();
    let _ = dispatcher_handle.await;
    let _ = checker_handle.await;
    tracing::info!("Shutdown complete");
}

/// Resolve on Ctrl-C or SIGTERM and cancel the broker's background
/// tasks alongside the HTTP server.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
