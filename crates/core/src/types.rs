/// Task identifiers are UUID v4 strings generated at submission time.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh task id.
pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}
