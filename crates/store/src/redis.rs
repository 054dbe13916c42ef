//! Redis store backend.
//!
//! Key layout matches the original middleware deployment so existing
//! stores keep working:
//!
//! - `comfyfile:tasks`         -- the FIFO submission queue (RPUSH/BLPOP)
//! - `comfyfile:task:{id}`     -- one serialized record per task
//! - `comfyfile:result:{id}`   -- one-shot pub/sub topic per task
//!
//! A single [`ConnectionManager`] (automatic reconnection) serves all
//! commands; each subscription opens its own pubsub connection so that
//! dropping the waiter tears down exactly its own subscription.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use comfyfile_core::{CompletionNotice, Task};
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{
    result_channel, task_key, NoticeStream, NoticeSubscription, StoreError, TaskStore, TASK_KEY_PREFIX,
    TASK_QUEUE,
};

/// Redis-backed [`TaskStore`].
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    /// Kept around to open dedicated pubsub connections per waiter.
    client: redis::Client,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    ///
    /// `redis_url` uses the standard scheme, e.g.
    /// `redis://:password@host:6379/0`. Sentinel/cluster topologies are
    /// configured through the same URL mechanism.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { manager, client };
        store.ping().await?;
        tracing::debug!(url = %redis_url, "Connected to Redis");
        Ok(store)
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn enqueue(&self, task: &Task) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(task)?;
        let mut conn = self.manager.clone();

        // Record first, then queue entry: a dispatcher that pops the
        // entry immediately must find the record already present.
        let _: () = conn.set(task_key(&task.id), &serialized).await?;
        let _: () = conn.rpush(TASK_QUEUE, &serialized).await?;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Task>, StoreError> {
        let mut conn = self.manager.clone();
        let timeout_secs = wait.as_secs().max(1) as usize;

        // BLPOP pops the head atomically across all consumers.
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(TASK_QUEUE)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_key, data)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let mut conn = self.manager.clone();
        let data: Option<String> = conn.get(task_key(id)).await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(task)?;
        let mut conn = self.manager.clone();
        let _: () = conn.set(task_key(&task.id), serialized).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(task_key(id)).await?;
        Ok(())
    }

    async fn scan_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.manager.clone();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{TASK_KEY_PREFIX}*"))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::with_capacity(values.len());
        for data in values.into_iter().flatten() {
            match serde_json::from_str(&data) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    // A corrupt record must not take the whole scan down.
                    tracing::warn!(error = %e, "Skipping unreadable task record");
                }
            }
        }
        Ok(tasks)
    }

    async fn publish(&self, notice: &CompletionNotice) -> Result<(), StoreError> {
        let payload = serde_json::to_string(notice)?;
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("PUBLISH")
            .arg(result_channel(&notice.task_id))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> Result<NoticeSubscription, StoreError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        pubsub.subscribe(result_channel(id)).await?;

        Ok(NoticeSubscription::new(Box::new(RedisNoticeStream {
            stream: Box::pin(pubsub.into_on_message()),
        })))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StoreError::Connection(format!(
                "Unexpected PING response: {pong}"
            )));
        }
        Ok(())
    }
}

struct RedisNoticeStream {
    /// Owns the pubsub connection; dropping it unsubscribes.
    stream: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl NoticeStream for RedisNoticeStream {
    async fn recv(&mut self) -> Option<CompletionNotice> {
        while let Some(msg) = self.stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Non-text message on result channel");
                    continue;
                }
            };
            match serde_json::from_str(&payload) {
                Ok(notice) => return Some(notice),
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable completion notice");
                }
            }
        }
        None
    }
}
