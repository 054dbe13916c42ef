//! The closed error taxonomy carried across every crate boundary.

use crate::types::TaskId;

/// Broker-level errors.
///
/// Every externally visible failure maps to exactly one of these
/// variants; transport- and store-level errors are classified at the
/// boundary where they occur rather than bubbled up untyped.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No instance is healthy and free. Not itself caller-facing:
    /// submissions queue up and are retried when capacity appears.
    #[error("No Comfyfile instance available")]
    InstanceUnavailable,

    /// The instance returned a failure or the transport failed during
    /// execution. The task record is Failed.
    #[error("Remote execution failed: {0}")]
    RemoteExecutionFailed(String),

    /// No terminal notice arrived within the waiter's bound. Does not
    /// alter the task's eventual real outcome.
    #[error("Timed out waiting for task result")]
    TaskTimeout,

    /// Status query for an id with no persisted record.
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    /// The wait was cancelled. Cooperative: any in-flight remote call
    /// runs to completion regardless.
    #[error("Task wait was cancelled")]
    Cancelled,

    /// The named instance is executing a task and cannot be removed.
    #[error("Instance {0} is busy")]
    InstanceBusy(String),

    /// No registered instance with that url.
    #[error("Instance {0} not found")]
    InstanceNotFound(String),

    /// A durable-store operation failed.
    #[error("Store error: {0}")]
    Store(String),
}

/// Convenience alias used throughout the broker crates.
pub type BrokerResult<T> = Result<T, BrokerError>;
