//! Durable task store interface and backends.
//!
//! The broker keeps no durable state of its own. Everything that must
//! survive a dispatch cycle lives behind [`TaskStore`]: a FIFO queue
//! of submissions, one key-value record per task, and a per-task
//! publish/subscribe topic used exactly once for the terminal notice.
//!
//! Two backends are provided: [`RedisStore`] for production and
//! [`MemoryStore`] for tests and single-node development. The store's
//! atomic pop-from-head is the primary mechanism preventing two
//! dispatch attempts from claiming the same task.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use comfyfile_core::{CompletionNotice, Task, TaskStatus};

pub use crate::memory::MemoryStore;
pub use crate::redis::RedisStore;

/// Errors from the durable store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the store at all.
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// A Redis command failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A task record or notice could not be (de)serialized.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A live subscription to one task's completion topic.
///
/// Dropping the subscription releases the underlying resource (for
/// Redis, the dedicated pubsub connection). This is how cleanup is
/// guaranteed on every waiter exit path, including the caller's
/// future being dropped mid-wait.
pub struct NoticeSubscription {
    inner: Box<dyn NoticeStream>,
}

impl NoticeSubscription {
    pub(crate) fn new(inner: Box<dyn NoticeStream>) -> Self {
        Self { inner }
    }

    /// Receive the next notice, or `None` if the topic is gone.
    pub async fn recv(&mut self) -> Option<CompletionNotice> {
        self.inner.recv().await
    }
}

#[async_trait]
pub(crate) trait NoticeStream: Send {
    async fn recv(&mut self) -> Option<CompletionNotice>;
}

/// The external durable collaborator.
///
/// All methods are suspension points; callers resuming after one must
/// re-read shared state rather than assume it unchanged.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist the record and push it onto the tail of the FIFO queue.
    async fn enqueue(&self, task: &Task) -> Result<(), StoreError>;

    /// Atomically pop the queue head, waiting at most `wait` so an
    /// empty queue returns promptly instead of blocking the caller.
    async fn dequeue(&self, wait: Duration) -> Result<Option<Task>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// Overwrite the task record. The dispatcher is the sole caller
    /// for status/result writes.
    async fn put_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn delete_task(&self, id: &str) -> Result<(), StoreError>;

    /// Full scan of the task keyspace. O(n) over all stored tasks;
    /// acceptable at moderate scale only.
    async fn scan_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Publish the terminal notice on the task's topic. At most once
    /// per task; lost if no subscriber exists at publish time.
    async fn publish(&self, notice: &CompletionNotice) -> Result<(), StoreError>;

    /// Subscribe to a task's completion topic.
    async fn subscribe(&self, id: &str) -> Result<NoticeSubscription, StoreError>;

    /// Liveness of the store itself.
    async fn ping(&self) -> Result<(), StoreError>;

    /// All tasks, newest first, paginated.
    async fn list_tasks(&self, limit: usize, offset: usize) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.scan_tasks().await?;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks.into_iter().skip(offset).take(limit).collect())
    }

    /// Tasks in the given status, newest first.
    async fn list_tasks_by_status(
        &self,
        status: TaskStatus,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.scan_tasks().await?;
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks
            .into_iter()
            .filter(|t| t.status == status)
            .take(limit)
            .collect())
    }

    /// Delete terminal records older than the cutoff. Pending and
    /// Processing records are never purged regardless of age.
    async fn purge_older_than(&self, days: i64) -> Result<usize, StoreError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let mut removed = 0;
        for task in self.scan_tasks().await? {
            if task.status.is_terminal() && task.created_at < cutoff {
                self.delete_task(&task.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Channel name for a task's completion topic.
pub(crate) fn result_channel(id: &str) -> String {
    format!("comfyfile:result:{id}")
}

/// Key for a task's persisted record.
pub(crate) fn task_key(id: &str) -> String {
    format!("comfyfile:task:{id}")
}

/// Name of the FIFO submission queue.
pub(crate) const TASK_QUEUE: &str = "comfyfile:tasks";

/// Prefix matched when scanning the task keyspace.
pub(crate) const TASK_KEY_PREFIX: &str = "comfyfile:task:";
