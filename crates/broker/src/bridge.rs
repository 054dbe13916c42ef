//! Synchronous result bridge.
//!
//! Lets a request handler submit a task and then block until the
//! dispatcher publishes the terminal notice, with a timeout and
//! cooperative cancellation. The bridge subscribes to the task's
//! completion topic *before* checking the stored record, so a task
//! that finished in between is still observed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use comfyfile_core::{BrokerError, BrokerResult, TaskId};
use comfyfile_store::TaskStore;
use tokio_util::sync::CancellationToken;

/// Bridges async completion notices to waiting request handlers.
pub struct ResultBridge {
    store: Arc<dyn TaskStore>,
    /// One cancellation token per task currently being waited on.
    /// Std mutex: held only for map access, and the drop guard must be
    /// able to lock it outside an async context.
    waiters: Mutex<HashMap<TaskId, WaiterEntry>>,
}

/// Shared wait state for one task id. Waits on the same id share the
/// token (so `cancel` releases all of them) but are counted, so the
/// entry outlives any single waiter.
struct WaiterEntry {
    token: CancellationToken,
    count: usize,
}

/// Unregisters one waiter on every exit path, including the caller's
/// future being dropped mid-wait. The map entry goes when the last
/// waiter on the id does.
struct WaiterGuard<'a> {
    id: &'a str,
    waiters: &'a Mutex<HashMap<TaskId, WaiterEntry>>,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut waiters = self.waiters.lock().expect("waiter registry poisoned");
        if let Some(entry) = waiters.get_mut(self.id) {
            entry.count -= 1;
            if entry.count == 0 {
                waiters.remove(self.id);
            }
        }
    }
}

impl ResultBridge {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Block until the task reaches a terminal state, the timeout
    /// elapses, or the wait is cancelled.
    ///
    /// Completed tasks yield their result payload; failed tasks map to
    /// [`BrokerError::RemoteExecutionFailed`]. A task that was already
    /// terminal before this call resolves immediately from the stored
    /// record.
    pub async fn await_result(
        &self,
        id: &str,
        timeout: Duration,
    ) -> BrokerResult<serde_json::Value> {
        // Subscribe first; the record check below closes the window
        // where the notice fires between the two.
        let mut subscription = self
            .store
            .subscribe(id)
            .await
            .map_err(|e| BrokerError::Store(e.to_string()))?;

        let token = {
            let mut waiters = self.waiters.lock().expect("waiter registry poisoned");
            let entry = waiters.entry(id.to_string()).or_insert_with(|| WaiterEntry {
                token: CancellationToken::new(),
                count: 0,
            });
            entry.count += 1;
            entry.token.clone()
        };
        let _guard = WaiterGuard {
            id,
            waiters: &self.waiters,
        };

        match self
            .store
            .get_task(id)
            .await
            .map_err(|e| BrokerError::Store(e.to_string()))?
        {
            None => return Err(BrokerError::TaskNotFound(id.to_string())),
            Some(task) if task.status.is_terminal() => {
                return match task.error {
                    Some(error) => Err(BrokerError::RemoteExecutionFailed(error)),
                    None => Ok(task.result.unwrap_or(serde_json::Value::Null)),
                };
            }
            Some(_) => {}
        }

        tokio::select! {
            notice = subscription.recv() => match notice {
                Some(notice) => notice.into_result(),
                // Topic torn down without a notice; the store went away.
                None => Err(BrokerError::Store(
                    "result subscription closed before completion".to_string(),
                )),
            },
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(task_id = id, "Result wait timed out");
                Err(BrokerError::TaskTimeout)
            }
            _ = token.cancelled() => {
                tracing::info!(task_id = id, "Result wait cancelled");
                Err(BrokerError::Cancelled)
            }
        }
    }

    /// Cancel the wait (if any) on one task. Returns whether a waiter
    /// was present. The task itself keeps running to completion.
    pub fn cancel(&self, id: &str) -> bool {
        let waiters = self.waiters.lock().expect("waiter registry poisoned");
        match waiters.get(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active wait. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let waiters = self.waiters.lock().expect("waiter registry poisoned");
        for entry in waiters.values() {
            entry.token.cancel();
        }
        waiters.values().map(|entry| entry.count).sum()
    }

    /// Number of requests currently blocked on a result.
    pub fn active_waiters(&self) -> usize {
        self.waiters
            .lock()
            .expect("waiter registry poisoned")
            .values()
            .map(|entry| entry.count)
            .sum()
    }
}
