//! Heartbeat ping/pong liveness monitoring.
//!
//! One sweep runs per heartbeat period across the whole registry. A
//! connection gets exactly one period of grace: it is pinged on one sweep and
//! evicted on the next if no pong arrived in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::Liveness;
use super::registry::ConnectionRegistry;

/// Result of a single sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections removed for missing the previous ping.
    pub evicted: usize,
    /// Connections sent a fresh ping.
    pub pinged: usize,
}

/// Periodically pings every connection and evicts unresponsive ones.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
}

impl HeartbeatMonitor {
    /// Create a monitor over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Run one sweep.
    ///
    /// Connections still pending from the last sweep are evicted. All others
    /// are marked pending and pinged. A ping that cannot be queued leaves the
    /// connection pending, so it is evicted on the next sweep.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for conn in self.registry.snapshot() {
            match conn.begin_ping() {
                Liveness::Pending => {
                    if self.registry.evict(&conn.id) {
                        report.evicted += 1;
                        info!(conn_id = %conn.id, "evicting unresponsive client");
                    }
                }
                Liveness::Alive => {
                    if !conn.ping() {
                        debug!(conn_id = %conn.id, "ping not queued");
                    }
                    report.pinged += 1;
                }
            }
        }
        report
    }

    /// Sweep every `period` until `cancel` fires.
    ///
    /// The first sweep happens one full period after start.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep();
                    debug!(evicted = report.evicted, pinged = report.pinged, "heartbeat sweep");
                }
            }
        }
        debug!("heartbeat stopped");
    }
}
