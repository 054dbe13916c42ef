//! Backend Comfyfile instances.
//!
//! An instance is one backend worker capable of executing a single
//! task at a time, reachable over HTTP. The registry owns the mutable
//! state; the health field is written only by the health checker and
//! the busy field only by the dispatcher, both under the registry's
//! lock.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Liveness of an instance as last observed by the health checker.
///
/// Instances start `Unknown` until the first probe; only `Healthy`
/// instances are eligible for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Static configuration for one instance, as supplied by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Base HTTP URL, e.g. `http://host:8288`. Immutable identity.
    pub url: String,

    /// Optional bearer token sent on every request to the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Runtime state of one registered instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub url: String,
    pub token: Option<String>,
    pub health: InstanceHealth,
    /// Stamped on every probe regardless of outcome.
    pub last_check: Option<Timestamp>,
    pub busy: bool,
}

impl Instance {
    pub fn from_config(config: InstanceConfig) -> Self {
        Self {
            // Endpoint paths are appended to the base URL, so a
            // trailing slash would double up.
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
            health: InstanceHealth::Unknown,
            last_check: None,
            busy: false,
        }
    }

    /// Eligible for dispatch: healthy and not executing a task.
    pub fn is_available(&self) -> bool {
        self.health == InstanceHealth::Healthy && !self.busy
    }
}

/// Read-only projection for status reporting. Deliberately excludes
/// the token.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub url: String,
    pub health: InstanceHealth,
    pub last_check: Option<Timestamp>,
    pub busy: bool,
}

impl From<&Instance> for InstanceView {
    fn from(instance: &Instance) -> Self {
        Self {
            url: instance.url.clone(),
            health: instance.health,
            last_check: instance.last_check,
            busy: instance.busy,
        }
    }
}
