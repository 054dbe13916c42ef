//! End-to-end broker tests against a fake Comfyfile backend.
//!
//! Spins up a real axum server on an ephemeral port that implements
//! the two instance endpoints (`/comfyfile/healthz`, `/comfyfile/run`)
//! and drives the full submit -> dispatch -> execute -> notify path
//! over a [`MemoryStore`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use comfyfile_broker::{ComfyfileClient, Dispatcher, HealthChecker, InstanceRegistry, ResultBridge, TaskQueue};
use comfyfile_core::{BrokerError, InstanceConfig, TaskStatus};
use comfyfile_store::{MemoryStore, TaskStore};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What the fake backend saw, in arrival order.
#[derive(Clone, Default)]
struct BackendState {
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

async fn fake_healthz() -> Json<serde_json::Value> {
    Json(json!({"success": true}))
}

async fn fake_run(
    State(state): State<BackendState>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if params.get("fail").and_then(|v| v.as_bool()) == Some(true) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "workflow exploded".into()));
    }
    if let Some(ms) = params.get("sleep_ms").and_then(|v| v.as_u64()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    state.received.lock().await.push(params.clone());
    Ok(Json(json!({"echo": params})))
}

/// Bind a fake backend on an ephemeral port, returning its base URL.
async fn spawn_backend(state: BackendState) -> String {
    let app = Router::new()
        .route("/comfyfile/healthz", get(fake_healthz))
        .route("/comfyfile/run", post(fake_run))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend serve");
    });
    format!("http://{addr}")
}

/// Everything a test needs, wired the way main() wires it.
struct Harness {
    store: MemoryStore,
    queue: TaskQueue,
    bridge: ResultBridge,
    checker: HealthChecker,
    cancel: CancellationToken,
}

impl Harness {
    async fn new(instance_urls: &[String]) -> Self {
        let store = MemoryStore::new();
        let store_dyn: Arc<dyn TaskStore> = Arc::new(store.clone());
        let registry = Arc::new(InstanceRegistry::new(
            instance_urls
                .iter()
                .map(|url| InstanceConfig {
                    url: url.clone(),
                    token: None,
                })
                .collect(),
        ));
        let client = ComfyfileClient::new();

        let (dispatcher, dispatch) =
            Dispatcher::new(store_dyn.clone(), registry.clone(), client.clone());
        let cancel = CancellationToken::new();
        tokio::spawn(dispatcher.run(cancel.clone()));

        let checker = HealthChecker::new(
            registry.clone(),
            client,
            dispatch.clone(),
            Duration::from_secs(60),
            Duration::from_secs(2),
        );

        Self {
            store,
            queue: TaskQueue::new(store_dyn.clone(), dispatch),
            bridge: ResultBridge::new(store_dyn),
            checker,
            cancel,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Test: submit -> dispatch -> result
// ---------------------------------------------------------------------------

/// A submitted task executes on the healthy instance and the waiting
/// caller receives the backend's response payload.
#[tokio::test]
async fn submit_and_wait_returns_backend_result() {
    let backend = BackendState::default();
    let url = spawn_backend(backend.clone()).await;
    let harness = Harness::new(&[url]).await;
    harness.checker.sweep().await;

    let id = harness
        .queue
        .submit(json!({"workflow": "hello"}))
        .await
        .expect("submit should succeed");

    let result = harness
        .bridge
        .await_result(&id, Duration::from_secs(5))
        .await
        .expect("task should complete");
    assert_eq!(result, json!({"echo": {"workflow": "hello"}}));

    let record = harness
        .store
        .get_task(&id)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.result, Some(result));
}

/// With a single instance, tasks run strictly in submission order.
#[tokio::test]
async fn single_instance_executes_in_fifo_order() {
    let backend = BackendState::default();
    let url = spawn_backend(backend.clone()).await;
    let harness = Harness::new(&[url]).await;
    harness.checker.sweep().await;

    let mut ids = Vec::new();
    for n in 0..3 {
        let id = harness
            .queue
            .submit(json!({"n": n}))
            .await
            .expect("submit should succeed");
        ids.push(id);
    }

    for id in &ids {
        harness
            .bridge
            .await_result(id, Duration::from_secs(5))
            .await
            .expect("task should complete");
    }

    let seen = backend.received.lock().await;
    let order: Vec<i64> = seen.iter().map(|p| p["n"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

/// A failing task reports its error to the waiter and does not stop
/// the instance from serving the next task.
#[tokio::test]
async fn failed_task_does_not_poison_the_instance() {
    let backend = BackendState::default();
    let url = spawn_backend(backend.clone()).await;
    let harness = Harness::new(&[url]).await;
    harness.checker.sweep().await;

    let bad = harness
        .queue
        .submit(json!({"fail": true}))
        .await
        .expect("submit should succeed");
    let good = harness
        .queue
        .submit(json!({"workflow": "after"}))
        .await
        .expect("submit should succeed");

    let err = harness
        .bridge
        .await_result(&bad, Duration::from_secs(5))
        .await
        .expect_err("failing workflow should error");
    assert!(matches!(err, BrokerError::RemoteExecutionFailed(_)));

    harness
        .bridge
        .await_result(&good, Duration::from_secs(5))
        .await
        .expect("next task should still complete");

    let record = harness
        .store
        .get_task(&bad)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.is_some());
}

// ---------------------------------------------------------------------------
// Test: capacity
// ---------------------------------------------------------------------------

/// With no healthy instance the task stays pending; a sweep that finds
/// capacity wakes the dispatcher and the task then runs.
#[tokio::test]
async fn task_waits_for_capacity_then_runs() {
    let backend = BackendState::default();
    let url = spawn_backend(backend.clone()).await;
    // Registry knows the instance but no sweep has run: Unknown health.
    let harness = Harness::new(&[url]).await;

    let id = harness
        .queue
        .submit(json!({"workflow": "patient"}))
        .await
        .expect("submit should succeed");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = harness
        .store
        .get_task(&id)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.status, TaskStatus::Pending);

    // The sweep discovers the healthy instance and triggers dispatch.
    harness.checker.sweep().await;

    harness
        .bridge
        .await_result(&id, Duration::from_secs(5))
        .await
        .expect("task should complete once capacity appears");
}

/// Two free instances execute two queued tasks concurrently: neither
/// wait takes anywhere near the serialized two-sleep total.
#[tokio::test]
async fn two_instances_execute_in_parallel() {
    let backend = BackendState::default();
    let url_a = spawn_backend(backend.clone()).await;
    let url_b = spawn_backend(backend.clone()).await;
    let harness = Harness::new(&[url_a, url_b]).await;
    harness.checker.sweep().await;

    let first = harness
        .queue
        .submit(json!({"n": 1, "sleep_ms": 700}))
        .await
        .expect("submit should succeed");
    let second = harness
        .queue
        .submit(json!({"n": 2, "sleep_ms": 700}))
        .await
        .expect("submit should succeed");

    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(
        harness.bridge.await_result(&first, Duration::from_secs(5)),
        harness.bridge.await_result(&second, Duration::from_secs(5)),
    );
    a.expect("first task should complete");
    b.expect("second task should complete");

    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(1200),
        "tasks took {elapsed:?}; executions did not overlap across instances"
    );
    assert_eq!(backend.received.lock().await.len(), 2);
}

/// Probing an address nothing listens on reads as unhealthy.
#[tokio::test]
async fn probe_of_dead_address_is_unhealthy() {
    // Bind-then-drop guarantees the port is closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = ComfyfileClient::new();
    let healthy = client
        .probe(&format!("http://{addr}"), None, Duration::from_millis(500))
        .await;
    assert!(!healthy);
}

// ---------------------------------------------------------------------------
// Test: the result bridge
// ---------------------------------------------------------------------------

/// A wait with no capacity at all times out with `TaskTimeout` and
/// leaves the record pending.
#[tokio::test]
async fn wait_times_out_when_nothing_executes() {
    let harness = Harness::new(&[]).await;

    let id = harness
        .queue
        .submit(json!({"workflow": "stuck"}))
        .await
        .expect("submit should succeed");

    let err = harness
        .bridge
        .await_result(&id, Duration::from_millis(200))
        .await
        .expect_err("wait should time out");
    assert!(matches!(err, BrokerError::TaskTimeout));

    let record = harness
        .store
        .get_task(&id)
        .await
        .expect("get should succeed")
        .expect("record should exist");
    assert_eq!(record.status, TaskStatus::Pending);
    assert_eq!(harness.bridge.active_waiters(), 0);
}

/// Cancelling an active wait resolves it with `Cancelled` and cleans
/// up the waiter entry.
#[tokio::test]
async fn cancel_releases_an_active_waiter() {
    let harness = Arc::new(Harness::new(&[]).await);

    let id = harness
        .queue
        .submit(json!({"workflow": "doomed wait"}))
        .await
        .expect("submit should succeed");

    let waiter = {
        let harness = harness.clone();
        let id = id.clone();
        tokio::spawn(async move {
            harness
                .bridge
                .await_result(&id, Duration::from_secs(30))
                .await
        })
    };

    // Let the waiter register before cancelling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.bridge.cancel(&id));

    let outcome = waiter.await.expect("waiter should not panic");
    assert!(matches!(outcome, Err(BrokerError::Cancelled)));
    assert_eq!(harness.bridge.active_waiters(), 0);

    // Cancelling again finds nobody.
    assert!(!harness.bridge.cancel(&id));
}

/// Two waits on the same task id are counted separately: the first one
/// finishing does not unregister the survivor, which stays cancellable.
#[tokio::test]
async fn second_waiter_on_same_task_survives_the_first() {
    let harness = Arc::new(Harness::new(&[]).await);

    let id = harness
        .queue
        .submit(json!({"workflow": "shared wait"}))
        .await
        .expect("submit should succeed");

    let short = {
        let harness = harness.clone();
        let id = id.clone();
        tokio::spawn(async move {
            harness
                .bridge
                .await_result(&id, Duration::from_millis(100))
                .await
        })
    };
    let long = {
        let harness = harness.clone();
        let id = id.clone();
        tokio::spawn(async move {
            harness
                .bridge
                .await_result(&id, Duration::from_secs(30))
                .await
        })
    };

    let outcome = short.await.expect("short waiter should not panic");
    assert!(matches!(outcome, Err(BrokerError::TaskTimeout)));

    // The long waiter is still registered and can be cancelled.
    assert_eq!(harness.bridge.active_waiters(), 1);
    assert!(harness.bridge.cancel(&id));
    let outcome = long.await.expect("long waiter should not panic");
    assert!(matches!(outcome, Err(BrokerError::Cancelled)));
    assert_eq!(harness.bridge.active_waiters(), 0);
}

/// cancel_all sweeps every active waiter at once.
#[tokio::test]
async fn cancel_all_sweeps_every_waiter() {
    let harness = Arc::new(Harness::new(&[]).await);

    let mut waiters = Vec::new();
    for n in 0..3 {
        let id = harness
            .queue
            .submit(json!({"n": n}))
            .await
            .expect("submit should succeed");
        let harness = harness.clone();
        waiters.push(tokio::spawn(async move {
            harness
                .bridge
                .await_result(&id, Duration::from_secs(30))
                .await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.bridge.cancel_all(), 3);
    for waiter in waiters {
        let outcome = waiter.await.expect("waiter should not panic");
        assert!(matches!(outcome, Err(BrokerError::Cancelled)));
    }
}

/// A waiter that arrives after the task finished resolves immediately
/// from the stored record instead of waiting for a notice that will
/// never come again.
#[tokio::test]
async fn late_waiter_resolves_from_the_record() {
    let backend = BackendState::default();
    let url = spawn_backend(backend.clone()).await;
    let harness = Harness::new(&[url]).await;
    harness.checker.sweep().await;

    let id = harness
        .queue
        .submit(json!({"workflow": "fast"}))
        .await
        .expect("submit should succeed");

    // Wait for the terminal record without subscribing.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = harness
            .store
            .get_task(&id)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        if record.status.is_terminal() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "task never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let result = harness
        .bridge
        .await_result(&id, Duration::from_millis(200))
        .await
        .expect("late wait should resolve from the record");
    assert_eq!(result, json!({"echo": {"workflow": "fast"}}));
}

/// Waiting on an ID that was never submitted is `TaskNotFound`.
#[tokio::test]
async fn waiting_on_unknown_task_is_not_found() {
    let harness = Harness::new(&[]).await;

    let err = harness
        .bridge
        .await_result("no-such-task", Duration::from_secs(1))
        .await
        .expect_err("unknown task should not resolve");
    assert!(matches!(err, BrokerError::TaskNotFound(_)));
}
