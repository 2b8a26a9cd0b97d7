//! Metrics collection for watcher monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Watcher metrics.
pub struct Metrics {
    /// Refreshes started.
    pub refreshes_started: AtomicU64,
    /// Refreshes that wrote both snapshots.
    pub refreshes_succeeded: AtomicU64,
    /// Refreshes that failed.
    pub refreshes_failed: AtomicU64,
    /// Refreshes rejected because one was already running.
    pub refreshes_rejected: AtomicU64,
    /// Subscribers whose band matched.
    pub triggers_matched: AtomicU64,
    /// Subscribers skipped for an unresolvable pair.
    pub subscribers_skipped: AtomicU64,
    /// Webhooks delivered.
    pub deliveries_succeeded: AtomicU64,
    /// Webhooks that failed.
    pub deliveries_failed: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            refreshes_started: AtomicU64::new(0),
            refreshes_succeeded: AtomicU64::new(0),
            refreshes_failed: AtomicU64::new(0),
            refreshes_rejected: AtomicU64::new(0),
            triggers_matched: AtomicU64::new(0),
            subscribers_skipped: AtomicU64::new(0),
            deliveries_succeeded: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
        }
    }

    pub fn refresh_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_succeeded(&self) {
        self.refreshes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refresh_rejected(&self) {
        self.refreshes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one evaluation pass.
    pub fn record_evaluation(&self, matched: usize, skipped: usize) {
        self.triggers_matched.fetch_add(matched as u64, Ordering::Relaxed);
        self.subscribers_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
    }

    /// Record the outcome of one dispatch batch.
    pub fn record_deliveries(&self, succeeded: usize, failed: usize) {
        self.deliveries_succeeded.fetch_add(succeeded as u64, Ordering::Relaxed);
        self.deliveries_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes_started: self.refreshes_started.load(Ordering::Relaxed),
            refreshes_succeeded: self.refreshes_succeeded.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            refreshes_rejected: self.refreshes_rejected.load(Ordering::Relaxed),
            triggers_matched: self.triggers_matched.load(Ordering::Relaxed),
            subscribers_skipped: self.subscribers_skipped.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP ratewatch_refreshes_started Total refresh cycles started
# TYPE ratewatch_refreshes_started counter
ratewatch_refreshes_started {}

# HELP ratewatch_refreshes_succeeded Total refresh cycles completed
# TYPE ratewatch_refreshes_succeeded counter
ratewatch_refreshes_succeeded {}

# HELP ratewatch_refreshes_failed Total refresh cycles failed
# TYPE ratewatch_refreshes_failed counter
ratewatch_refreshes_failed {}

# HELP ratewatch_refreshes_rejected Total refreshes rejected while one was running
# TYPE ratewatch_refreshes_rejected counter
ratewatch_refreshes_rejected {}

# HELP ratewatch_triggers_matched Total subscribers whose band matched
# TYPE ratewatch_triggers_matched counter
ratewatch_triggers_matched {}

# HELP ratewatch_subscribers_skipped Total subscribers skipped for an unresolvable pair
# TYPE ratewatch_subscribers_skipped counter
ratewatch_subscribers_skipped {}

# HELP ratewatch_deliveries_succeeded Total webhooks delivered
# TYPE ratewatch_deliveries_succeeded counter
ratewatch_deliveries_succeeded {}

# HELP ratewatch_deliveries_failed Total webhook deliveries failed
# TYPE ratewatch_deliveries_failed counter
ratewatch_deliveries_failed {}
"#,
            snapshot.refreshes_started,
            snapshot.refreshes_succeeded,
            snapshot.refreshes_failed,
            snapshot.refreshes_rejected,
            snapshot.triggers_matched,
            snapshot.subscribers_skipped,
            snapshot.deliveries_succeeded,
            snapshot.deliveries_failed,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub refreshes_started: u64,
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub refreshes_rejected: u64,
    pub triggers_matched: u64,
    pub subscribers_skipped: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
