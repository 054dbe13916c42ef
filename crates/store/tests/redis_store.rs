//! Smoke test for the Redis backend.
//!
//! Requires a live Redis server; run explicitly with
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test -p comfyfile-store -- --ignored`.

use std::time::Duration;

use comfyfile_core::{CompletionNotice, Task, TaskStatus};
use comfyfile_store::{RedisStore, TaskStore};
use serde_json::json;

/// Full pass over the store contract against a real server: enqueue,
/// pop, record update, pub/sub notice, delete.
#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn redis_round_trip() {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = RedisStore::connect(&url)
        .await
        .expect("Redis should be reachable");

    let task = Task::new(json!({"workflow": "smoke"}));
    store.enqueue(&task).await.expect("enqueue should succeed");

    let popped = store
        .dequeue(Duration::from_secs(2))
        .await
        .expect("dequeue should succeed")
        .expect("queue should hold the task");
    assert_eq!(popped.id, task.id);

    let mut done = popped;
    done.status = TaskStatus::Completed;
    done.result = Some(json!({"images": []}));
    store.put_task(&done).await.expect("put should succeed");

    let mut sub = store
        .subscribe(&task.id)
        .await
        .expect("subscribe should succeed");
    store
        .publish(&CompletionNotice::completed(
            task.id.clone(),
            json!({"images": []}),
        ))
        .await
        .expect("publish should succeed");

    let notice = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("notice should arrive in time")
        .expect("subscription should stay open");
    assert_eq!(notice.task_id, task.id);

    store
        .delete_task(&task.id)
        .await
        .expect("delete should succeed");
    assert!(store
        .get_task(&task.id)
        .await
        .expect("get should succeed")
        .is_none());
}
