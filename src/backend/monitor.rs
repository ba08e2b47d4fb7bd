/**
 * Resource Monitor
 *
 * Periodic `tracing` diagnostics of the backend: registered connections,
 * subscriptions held by each connection, live pub/sub channels and
 * submits in flight.
 */

use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::sync::{BackendStats, SyncBackend};

#[derive(Clone, Debug)]
pub struct ResourceMonitor {
    backend: SyncBackend,
}

impl ResourceMonitor {
    pub fn new(backend: SyncBackend) -> Self {
        Self { backend }
    }

    /// Log one report and return the totals
    pub fn report(&self) -> BackendStats {
        let stats = self.backend.stats();
        tracing::info!(
            connections = stats.connections,
            subscriptions = stats.subscriptions,
            channels = stats.channels,
            in_flight = stats.in_flight,
            "Backend resources"
        );

        for (handle, info) in self.backend.connections() {
            tracing::debug!(
                handle,
                client_id = %info.client_id,
                user_id = info.user_id.as_deref().unwrap_or("-"),
                trusted = info.trusted,
                subscriptions = info.subscriptions.load(std::sync::atomic::Ordering::SeqCst),
                "Connection"
            );
        }
        stats
    }

    /// Report every `interval` until the task is aborted
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.report();
            }
        })
    }
}
