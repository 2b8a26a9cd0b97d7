//! Ratewatch Service
//!
//! Wires the rate tracking and notification crates into a running service:
//! configuration, metrics and the [`Watcher`] that refreshes rates and
//! notifies subscribers on a timer.

pub mod config;
pub mod metrics;
pub mod state;
pub mod watcher;

pub use config::{ServiceConfig, StorageBackend};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use state::WatcherState;
pub use watcher::{CycleReport, Watcher};
