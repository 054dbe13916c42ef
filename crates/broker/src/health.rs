//! Periodic instance health sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::ComfyfileClient;
use crate::dispatcher::DispatchHandle;
use crate::registry::InstanceRegistry;

/// Probes every registered instance on a fixed interval and folds the
/// results into the registry. When a sweep changes available capacity
/// (an instance came back, or a dead one was force-released) it wakes
/// the dispatcher so queued tasks are not left waiting for the next
/// submission.
pub struct HealthChecker {
    registry: Arc<InstanceRegistry>,
    client: ComfyfileClient,
    dispatch: DispatchHandle,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        client: ComfyfileClient,
        dispatch: DispatchHandle,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            dispatch,
            interval,
            probe_timeout,
        }
    }

    /// Run sweeps until the cancellation token is triggered. The first
    /// sweep runs immediately so instances leave `Unknown` at startup
    /// without waiting a full interval.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Health checker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Health checker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// Probe all instances concurrently and apply the results.
    pub async fn sweep(&self) {
        let targets = self.registry.probe_targets().await;
        if targets.is_empty() {
            return;
        }

        let probes = targets.into_iter().map(|(url, token)| {
            let client = self.client.clone();
            let timeout = self.probe_timeout;
            async move {
                let healthy = client.probe(&url, token.as_deref(), timeout).await;
                (url, healthy)
            }
        });
        let results = futures::future::join_all(probes).await;

        let healthy = results.iter().filter(|(_, h)| *h).count();
        tracing::debug!(healthy, total = results.len(), "Health sweep complete");

        let summary = self.registry.apply_sweep(&results, chrono::Utc::now()).await;
        if summary.changed || summary.freed {
            tracing::info!(
                changed = summary.changed,
                freed = summary.freed,
                "Capacity changed, waking dispatcher",
            );
            self.dispatch.trigger();
        }
    }
}
