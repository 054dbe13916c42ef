//! Task brokering: instance registry, health checking, dispatch, and
//! the sync/async result bridge.
//!
//! The broker sits between the HTTP surface and the backend Comfyfile
//! instances. Submissions flow through [`TaskQueue`] into the durable
//! store; a single [`Dispatcher`] worker pairs queued tasks with
//! available instances from the [`InstanceRegistry`] and executes them
//! over HTTP via [`ComfyfileClient`]; [`ResultBridge`] lets a request
//! handler block on a task's terminal notice with timeout and
//! cancellation.

pub mod bridge;
pub mod client;
pub mod dispatcher;
pub mod health;
pub mod queue;
pub mod registry;

pub use crate::bridge::ResultBridge;
pub use crate::client::{ClientError, ComfyfileClient};
pub use crate::dispatcher::{DispatchHandle, Dispatcher};
pub use crate::health::HealthChecker;
pub use crate::queue::TaskQueue;
pub use crate::registry::{ClaimedInstance, InstanceRegistry};
