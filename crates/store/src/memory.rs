//! In-memory store backend.
//!
//! Implements the same contract as the Redis backend with process-local
//! structures: a `VecDeque` plus `Notify` for the bounded-wait queue,
//! a `HashMap` for task records, and per-task `broadcast` channels for
//! completion topics. Used by the test suites and for single-node
//! development without a Redis server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use comfyfile_core::{CompletionNotice, Task};
use tokio::sync::{broadcast, Mutex, Notify};

use crate::{NoticeStream, NoticeSubscription, StoreError, TaskStore};

/// Buffer for one topic. A topic carries at most one message.
const TOPIC_CAPACITY: usize = 4;

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<Task>>,
    records: Mutex<HashMap<String, Task>>,
    /// Senders exist only while at least one waiter has subscribed;
    /// publishing to a task nobody listens on drops the notice, same
    /// as Redis pub/sub.
    topics: Mutex<HashMap<String, broadcast::Sender<CompletionNotice>>>,
}

/// Process-local [`TaskStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    queue_notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn enqueue(&self, task: &Task) -> Result<(), StoreError> {
        self.inner
            .records
            .lock()
            .await
            .insert(task.id.clone(), task.clone());
        self.inner.queue.lock().await.push_back(task.clone());
        self.queue_notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Task>, StoreError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(task) = self.inner.queue.lock().await.pop_front() {
                return Ok(Some(task));
            }
            let notified = self.queue_notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.records.lock().await.get(id).cloned())
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        self.inner
            .records
            .lock()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.inner.records.lock().await.remove(id);
        Ok(())
    }

    async fn scan_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.inner.records.lock().await.values().cloned().collect())
    }

    async fn publish(&self, notice: &CompletionNotice) -> Result<(), StoreError> {
        // The topic is one-shot: remove the sender once the terminal
        // notice is out so abandoned topics do not accumulate.
        let sender = self.inner.topics.lock().await.remove(&notice.task_id);
        if let Some(sender) = sender {
            // No live receiver means the waiter already went away
            // and the notice is lost, matching Redis pub/sub.
            let _ = sender.send(notice.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> Result<NoticeSubscription, StoreError> {
        let mut topics = self.inner.topics.lock().await;
        let sender = topics
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
        Ok(NoticeSubscription::new(Box::new(MemoryNoticeStream {
            rx: sender.subscribe(),
        })))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryNoticeStream {
    rx: broadcast::Receiver<CompletionNotice>,
}

#[async_trait]
impl NoticeStream for MemoryNoticeStream {
    async fn recv(&mut self) -> Option<CompletionNotice> {
        loop {
            match self.rx.recv().await {
                Ok(notice) => return Some(notice),
                // Lagged cannot drop the single terminal notice with
                // TOPIC_CAPACITY > 1, but keep the loop total anyway.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
