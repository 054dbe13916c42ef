//! Submission side of the broker.

use std::sync::Arc;

use comfyfile_core::{BrokerError, BrokerResult, Task, TaskId};
use comfyfile_store::TaskStore;

use crate::dispatcher::DispatchHandle;

/// Accepts workflow submissions and hands them to the durable queue.
pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    dispatch: DispatchHandle,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn TaskStore>, dispatch: DispatchHandle) -> Self {
        Self { store, dispatch }
    }

    /// Persist a new pending task, wake the dispatcher, and return the
    /// task ID the caller can wait on or poll.
    pub async fn submit(&self, params: serde_json::Value) -> BrokerResult<TaskId> {
        let task = Task::new(params);
        self.store
            .enqueue(&task)
            .await
            .map_err(|e| BrokerError::Store(e.to_string()))?;
        tracing::info!(task_id = %task.id, "Task queued");
        self.dispatch.trigger();
        Ok(task.id)
    }
}
