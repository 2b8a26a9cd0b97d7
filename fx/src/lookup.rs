//! Cross-rate lookups against stored snapshots.

use std::sync::Arc;

use ratewatch_common::{Currency, RateSnapshot, RatewatchError, SnapshotName};
use tracing::instrument;

use crate::error::FxResult;
use crate::store::RateStore;

/// Reads cross rates out of a [`RateStore`].
///
/// A missing snapshot is reported as [`RatewatchError::SnapshotNotFound`],
/// which callers should read as "not yet refreshed".
#[derive(Clone)]
pub struct RateLookup {
    store: Arc<dyn RateStore>,
}

impl RateLookup {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    /// Read a whole snapshot.
    pub async fn snapshot(&self, name: SnapshotName) -> FxResult<RateSnapshot> {
        self.store
            .get(name)
            .await?
            .ok_or(RatewatchError::SnapshotNotFound(name))
    }

    /// Price of one unit of `from` in `to`, according to snapshot `name`.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub async fn rate(&self, from: &Currency, to: &Currency, name: SnapshotName) -> FxResult<f64> {
        self.snapshot(name).await?.rate(from, to)
    }

    /// Cross rate from the latest snapshot.
    pub async fn latest(&self, from: &Currency, to: &Currency) -> FxResult<f64> {
        self.rate(from, to, SnapshotName::Latest).await
    }

    /// Cross rate from the trailing-average snapshot.
    pub async fn average(&self, from: &Currency, to: &Currency) -> FxResult<f64> {
        self.rate(from, to, SnapshotName::Average).await
    }
}
