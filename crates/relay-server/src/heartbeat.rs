//! Heartbeat sweeper: periodic liveness probes over every registered connection.

use std::sync::Arc;
use std::time::Duration;

use relay_core::protocol::PROBE_PAYLOAD;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info};

use crate::metrics::{EVICTIONS_TOTAL, PROBES_TOTAL};
use crate::registry::Registry;

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections probed.
    pub probed: usize,
    /// Connections removed because their probe failed.
    pub evicted: usize,
}

/// Probes every connection on a fixed interval and evicts the dead ones.
pub struct HeartbeatSweeper {
    registry: Arc<Registry>,
    interval: Duration,
    probe_timeout: Duration,
    span: Span,
}

impl HeartbeatSweeper {
    /// Create a sweeper. Each probe is bounded by `probe_timeout`.
    pub fn new(
        registry: Arc<Registry>,
        interval: Duration,
        probe_timeout: Duration,
        span: Span,
    ) -> Self {
        Self {
            registry,
            interval,
            probe_timeout,
            span,
        }
    }

    /// Probe every connection once.
    ///
    /// Probes and evictions run concurrently outside the registry lock; one
    /// failing or slow connection never holds up the others.
    pub async fn sweep_once(&self) -> SweepReport {
        let snapshot = self.registry.snapshot().await;
        let probes = snapshot.iter().map(|connection| async move {
            let outcome = tokio::time::timeout(
                self.probe_timeout,
                connection.transport().send_ping(PROBE_PAYLOAD),
            )
            .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("probe timed out after {:?}", self.probe_timeout)),
            };
            (connection, failure)
        });
        let results = futures::future::join_all(probes).await;

        let probed = results.len();
        let evictions = results
            .into_iter()
            .filter_map(|(connection, failure)| failure.map(|reason| (connection, reason)))
            .map(|(connection, reason)| async move {
                debug!(parent: &self.span, identity = %connection.identity(), %reason, "probe failed");
                self.registry
                    .remove_connection(connection.identity(), connection.transport())
                    .await
            });
        let evicted = futures::future::join_all(evictions)
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();

        let report = SweepReport { probed, evicted };

        metrics::counter!(PROBES_TOTAL).increment(report.probed as u64);
        metrics::counter!(EVICTIONS_TOTAL).increment(report.evicted as u64);
        if report.evicted > 0 {
            info!(parent: &self.span, probed = report.probed, evicted = report.evicted, "heartbeat evicted connections");
        }
        report
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; sweeping starts one interval in.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(parent: &self.span, "heartbeat sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let _ = self.sweep_once().await;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
