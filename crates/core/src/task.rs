//! Task records and completion notices.
//!
//! A task is one workflow-execution request. Records are owned by the
//! durable store; the dispatcher is the sole writer of status/result,
//! and status transitions are monotone: Pending -> Processing ->
//! exactly one of Completed or Failed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BrokerError;
use crate::types::{new_task_id, TaskId, Timestamp};

/// Lifecycle status of a task.
///
/// Wire names are lowercase to match the stored record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// A terminal status is never followed by another write.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One workflow-execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique id, generated at submission.
    pub id: TaskId,

    /// Opaque payload forwarded verbatim to the instance.
    pub params: Value,

    /// Submission time (UTC).
    pub created_at: Timestamp,

    pub status: TaskStatus,

    /// Response payload, present only once Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error description, present only once Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a fresh Pending task for the given params.
    pub fn new(params: Value) -> Self {
        Self {
            id: new_task_id(),
            params,
            created_at: chrono::Utc::now(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// The at-most-once terminal message published on a task's topic.
///
/// Wire shape matches the stored contract: `{"task_id", "data"}` on
/// success, `{"task_id", "error"}` on failure. Not persisted -- if no
/// subscriber exists when it is published, the notice is lost and a
/// late waiter must fall back to reading the task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub task_id: TaskId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionNotice {
    pub fn completed(task_id: TaskId, data: Value) -> Self {
        Self {
            task_id,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Resolve the notice into the waiter-facing outcome.
    ///
    /// An error marker wins over a payload if both are somehow present.
    pub fn into_result(self) -> Result<Value, BrokerError> {
        if let Some(error) = self.error {
            return Err(BrokerError::RemoteExecutionFailed(error));
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn new_task_starts_pending_with_unique_id() {
        let a = Task::new(json!({"workflow": 1}));
        let b = Task::new(json!({"workflow": 2}));

        assert_eq!(a.status, TaskStatus::Pending);
        assert!(a.result.is_none());
        assert!(a.error.is_none());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failed);
    }

    #[test]
    fn record_roundtrips_without_optional_fields() {
        let task = Task::new(json!({"n": 1}));
        let encoded = serde_json::to_string(&task).unwrap();

        // Absent result/error must not appear on the wire.
        assert!(!encoded.contains("result"));
        assert!(!encoded.contains("error"));

        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, task.id);
        assert_eq!(decoded.status, TaskStatus::Pending);
    }

    #[test]
    fn success_notice_resolves_to_payload() {
        let notice = CompletionNotice::completed("t1".into(), json!({"images": ["a.png"]}));
        assert_eq!(notice.into_result().unwrap(), json!({"images": ["a.png"]}));
    }

    #[test]
    fn error_notice_resolves_to_execution_failure() {
        let notice = CompletionNotice::failed("t1".into(), "boom");
        assert_matches!(
            notice.into_result(),
            Err(BrokerError::RemoteExecutionFailed(msg)) if msg == "boom"
        );
    }
}
