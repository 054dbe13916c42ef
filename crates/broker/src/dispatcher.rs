//! Background task dispatcher.
//!
//! A single long-lived Tokio task that pairs queued tasks with
//! available instances. It never polls on a timer: it sleeps until a
//! [`DispatchHandle::trigger`] arrives (new submission, instance
//! released, capacity change from a health sweep) and then drains the
//! queue as far as current capacity allows. Each claimed pair runs on
//! its own spawned task, so executions overlap across instances while
//! claiming and popping stay on the single drain loop.

use std::sync::Arc;
use std::time::Duration;

use comfyfile_core::{CompletionNotice, Task, TaskStatus};
use comfyfile_store::TaskStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::ComfyfileClient;
use crate::registry::{ClaimedInstance, InstanceRegistry};

/// How long one drain step waits on an empty queue before concluding
/// there is nothing to do. Short: a fresh trigger re-enters the drain.
const POP_WAIT: Duration = Duration::from_secs(1);

/// Wakes the dispatcher. Cheap to clone into handlers and the health
/// checker.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<()>,
}

impl DispatchHandle {
    /// Request a dispatch pass. Triggers coalesce: if the dispatcher
    /// already has a wakeup pending, this one merges into it, since a
    /// pending pass will observe the state this trigger announces.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Background dispatcher; see the module docs for the wakeup model.
pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    registry: Arc<InstanceRegistry>,
    client: ComfyfileClient,
    rx: mpsc::Receiver<()>,
    handle: DispatchHandle,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<InstanceRegistry>,
        client: ComfyfileClient,
    ) -> (Self, DispatchHandle) {
        // Capacity 1 is the coalescing: one buffered wakeup at most.
        let (tx, rx) = mpsc::channel(1);
        let handle = DispatchHandle { tx };
        (
            Self {
                store,
                registry,
                client,
                rx,
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Run until the cancellation token is triggered.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Task dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Task dispatcher shutting down");
                    break;
                }
                wakeup = self.rx.recv() => {
                    if wakeup.is_none() {
                        break;
                    }
                    self.drain().await;
                }
            }
        }
    }

    /// One drain pass: keep claiming instances and popping tasks until
    /// either runs out. Execution happens off the loop, so a pass with
    /// two free instances and two queued tasks starts both before
    /// either finishes.
    async fn drain(&self) {
        loop {
            let Some(claimed) = self.registry.claim_available().await else {
                return;
            };

            let task = match self.store.dequeue(POP_WAIT).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    self.registry.release(&claimed.url).await;
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop the task queue");
                    self.registry.release(&claimed.url).await;
                    return;
                }
            };

            let store = self.store.clone();
            let client = self.client.clone();
            let registry = self.registry.clone();
            let handle = self.handle.clone();
            tokio::spawn(async move {
                execute(store.as_ref(), &client, &claimed, task).await;
                registry.release(&claimed.url).await;
                // The freed instance may serve the next queued task.
                handle.trigger();
            });
        }
    }
}

/// Execute one task on a claimed instance and record the outcome.
async fn execute(
    store: &dyn TaskStore,
    client: &ComfyfileClient,
    instance: &ClaimedInstance,
    mut task: Task,
) {
    tracing::info!(task_id = %task.id, url = %instance.url, "Task claimed for execution");

    task.status = TaskStatus::Processing;
    if let Err(e) = store.put_task(&task).await {
        tracing::error!(task_id = %task.id, error = %e, "Failed to mark task processing");
    }

    let notice = match client.run_workflow(instance, &task.params).await {
        Ok(result) => {
            task.status = TaskStatus::Completed;
            task.result = Some(result.clone());
            tracing::info!(task_id = %task.id, "Task completed");
            CompletionNotice::completed(task.id.clone(), result)
        }
        Err(e) => {
            let message = e.to_string();
            task.status = TaskStatus::Failed;
            task.error = Some(message.clone());
            tracing::error!(task_id = %task.id, error = %message, "Task failed");
            CompletionNotice::failed(task.id.clone(), message)
        }
    };

    // Record first, then notify: a waiter woken by the notice (or
    // a late waiter falling back to the record) must see the
    // terminal state.
    if let Err(e) = store.put_task(&task).await {
        tracing::error!(task_id = %task.id, error = %e, "Failed to record task outcome");
    }
    if let Err(e) = store.publish(&notice).await {
        tracing::error!(task_id = %task.id, error = %e, "Failed to publish completion notice");
    }
}
