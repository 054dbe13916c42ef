//! Shared domain types for the Comfyfile task broker.
//!
//! This crate has no internal dependencies and defines the vocabulary
//! used everywhere else: tasks and their lifecycle, backend instances
//! and their health, completion notices, and the closed error taxonomy
//! carried across crate boundaries.

pub mod error;
pub mod instance;
pub mod task;
pub mod types;

pub use error::{BrokerError, BrokerResult};
pub use instance::{Instance, InstanceConfig, InstanceHealth, InstanceView};
pub use task::{CompletionNotice, Task, TaskStatus};
pub use types::{TaskId, Timestamp};
