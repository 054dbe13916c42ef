//! In-memory registry of backend Comfyfile instances.
//!
//! Holds the authoritative list of known instances with their health
//! and busy state. All mutation goes through one [`tokio::sync::Mutex`]
//! so that claiming (select an available instance and mark it busy) is
//! a single atomic step -- two dispatch attempts can never claim the
//! same instance.

use comfyfile_core::{
    BrokerError, BrokerResult, Instance, InstanceConfig, InstanceHealth, InstanceView, Timestamp,
};
use tokio::sync::Mutex;

/// Snapshot of a claimed instance handed to the dispatcher.
///
/// A plain value, not a guard: the claim is released explicitly via
/// [`InstanceRegistry::release`] once execution finishes.
#[derive(Debug, Clone)]
pub struct ClaimedInstance {
    pub url: String,
    pub token: Option<String>,
}

/// Outcome of applying one health sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Any instance's availability flipped during this sweep.
    pub changed: bool,
    /// An unhealthy instance had its busy flag force-cleared.
    pub freed: bool,
}

/// Registry of known backend instances.
pub struct InstanceRegistry {
    instances: Mutex<Vec<Instance>>,
}

impl InstanceRegistry {
    /// Seed the registry from configuration. All instances start with
    /// [`InstanceHealth::Unknown`] until the first sweep runs.
    pub fn new(configs: Vec<InstanceConfig>) -> Self {
        Self {
            instances: Mutex::new(configs.into_iter().map(Instance::from_config).collect()),
        }
    }

    /// Claim the first available instance, marking it busy.
    ///
    /// Selection and the busy flip happen under one lock acquisition,
    /// which is the atomicity the dispatcher relies on. Instances are
    /// scanned in registration order, so earlier instances see more
    /// traffic; there is no fairness guarantee.
    pub async fn claim_available(&self) -> Option<ClaimedInstance> {
        let mut instances = self.instances.lock().await;
        let instance = instances.iter_mut().find(|i| i.is_available())?;
        instance.busy = true;
        Some(ClaimedInstance {
            url: instance.url.clone(),
            token: instance.token.clone(),
        })
    }

    /// Release a claimed instance so it can serve the next task.
    ///
    /// Tolerates an instance that disappeared while busy (removed by a
    /// sweep race is impossible, but an operator cannot remove a busy
    /// instance either; the lookup still guards against surprises).
    pub async fn release(&self, url: &str) {
        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.iter_mut().find(|i| i.url == url) {
            instance.busy = false;
        } else {
            tracing::warn!(url, "Released an instance that is no longer registered");
        }
    }

    /// Register a new instance, or update the token of an existing one.
    ///
    /// An instance re-registered under a known URL keeps its health and
    /// busy state; only the token is refreshed.
    pub async fn add(&self, config: InstanceConfig) {
        let mut instances = self.instances.lock().await;
        let url = config.url.trim_end_matches('/');
        if let Some(existing) = instances.iter_mut().find(|i| i.url == url) {
            existing.token = config.token;
            return;
        }
        instances.push(Instance::from_config(config));
    }

    /// Remove an instance from the registry.
    ///
    /// Refused while the instance is executing a task; release happens
    /// when the dispatch completes, after which removal succeeds.
    pub async fn remove(&self, url: &str) -> BrokerResult<()> {
        let mut instances = self.instances.lock().await;
        let position = instances
            .iter()
            .position(|i| i.url == url)
            .ok_or_else(|| BrokerError::InstanceNotFound(url.to_string()))?;
        if instances[position].busy {
            return Err(BrokerError::InstanceBusy(url.to_string()));
        }
        instances.remove(position);
        Ok(())
    }

    /// Safe-to-expose view of every registered instance.
    pub async fn list(&self) -> Vec<InstanceView> {
        self.instances.lock().await.iter().map(InstanceView::from).collect()
    }

    /// `true` when no instances are registered at all.
    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }

    /// The first registered instance, for proxy fallback. Health and
    /// busy state are deliberately ignored here.
    pub async fn first(&self) -> Option<ClaimedInstance> {
        self.instances.lock().await.first().map(|i| ClaimedInstance {
            url: i.url.clone(),
            token: i.token.clone(),
        })
    }

    /// URL/token pairs to probe in the next health sweep.
    pub async fn probe_targets(&self) -> Vec<(String, Option<String>)> {
        self.instances
            .lock()
            .await
            .iter()
            .map(|i| (i.url.clone(), i.token.clone()))
            .collect()
    }

    /// Fold one sweep's probe results back into the registry.
    ///
    /// An instance that turned unhealthy has its busy flag cleared as
    /// well: the in-flight dispatch (if any) will fail on its own, and
    /// a crashed instance must not stay leased forever.
    pub async fn apply_sweep(
        &self,
        results: &[(String, bool)],
        now: Timestamp,
    ) -> SweepSummary {
        let mut instances = self.instances.lock().await;
        let mut summary = SweepSummary::default();

        for (url, healthy) in results {
            let Some(instance) = instances.iter_mut().find(|i| i.url == *url) else {
                // Removed between probe start and sweep application.
                continue;
            };
            let was_available = instance.is_available();
            instance.health = if *healthy {
                InstanceHealth::Healthy
            } else {
                InstanceHealth::Unhealthy
            };
            instance.last_check = Some(now);
            if !healthy && instance.busy {
                instance.busy = false;
                summary.freed = true;
                tracing::warn!(url, "Unhealthy instance force-released");
            }
            if instance.is_available() != was_available {
                summary.changed = true;
            }
        }
        summary
    }
}
