//! Refresh cycle: wipe, fetch latest, fetch and average, write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ratewatch_common::{Currency, RateSnapshot, RatewatchError, SnapshotName};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::RateAggregator;
use crate::error::FxResult;
use crate::provider::RateProvider;
use crate::store::RateStore;

/// Result of a completed refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Identifier for log correlation.
    pub cycle_id: Uuid,
    /// The snapshot written under "latest".
    pub latest: RateSnapshot,
    /// The snapshot written under "average".
    pub average: RateSnapshot,
    /// Wall time spent on the cycle.
    pub elapsed: Duration,
}

/// Orchestrates refreshes of the "latest" and "average" snapshots.
///
/// Only one refresh runs at a time. A wipe followed by a concurrent wipe
/// would let two cycles interleave their writes, so an overlapping call is
/// rejected with [`RatewatchError::RefreshInProgress`] instead of queued.
pub struct RateRefreshCycle {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    aggregator: RateAggregator,
    base: Currency,
    in_flight: Mutex<()>,
}

impl RateRefreshCycle {
    /// Create a new refresh cycle.
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        base: Currency,
        aggregator: RateAggregator,
    ) -> Self {
        Self {
            provider,
            store,
            aggregator,
            base,
            in_flight: Mutex::new(()),
        }
    }

    /// The base currency every snapshot is expressed in.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Check if a refresh is currently running.
    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Run one refresh.
    ///
    /// On failure the store is left as the failing step found it: possibly
    /// empty, possibly holding only "latest". Nothing is retried or rolled
    /// back.
    #[instrument(skip(self), fields(base = %self.base, provider = self.provider.name(), store = self.store.name()))]
    pub async fn refresh(&self) -> FxResult<RefreshOutcome> {
        let _guard = self.in_flight.try_lock().map_err(|_| {
            warn!("Refresh requested while another is running");
            RatewatchError::RefreshInProgress
        })?;

        let cycle_id = Uuid::now_v7();
        let started = Instant::now();
        info!(cycle_id = %cycle_id, "Starting rate refresh");

        match self.run(cycle_id, started).await {
            Ok(outcome) => {
                info!(
                    cycle_id = %cycle_id,
                    currencies = outcome.latest.rates.len(),
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Rate refresh completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Rate refresh abandoned");
                Err(e)
            }
        }
    }

    async fn run(&self, cycle_id: Uuid, started: Instant) -> FxResult<RefreshOutcome> {
        self.store.clear().await?;

        let rates = self.provider.fetch(&self.base, None).await?;
        let latest = RateSnapshot::new(SnapshotName::Latest, self.base.clone(), rates);
        self.store.put(latest.clone()).await?;

        let averaged = self
            .aggregator
            .compute_trailing_average(self.provider.as_ref(), &self.base)
            .await?;
        let average = RateSnapshot::new(SnapshotName::Average, self.base.clone(), averaged);
        self.store.put(average.clone()).await?;

        Ok(RefreshOutcome {
            cycle_id,
            latest,
            average,
            elapsed: started.elapsed(),
        })
    }
}

/// Run a single refresh with the default seven-day aggregator.
pub async fn refresh(
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    base: Currency,
) -> FxResult<RefreshOutcome> {
    RateRefreshCycle::new(provider, store, base, RateAggregator::default())
        .refresh()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::RateLookup;
    use crate::provider::MockRateProvider;
    use crate::store::InMemoryRateStore;
    use async_trait::async_trait;
    use ratewatch_common::RateTable;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose operations can be made to fail on demand.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryRateStore,
        fail_clear: AtomicBool,
        fail_put: parking_lot::Mutex<Option<SnapshotName>>,
    }

    #[async_trait]
    impl RateStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn clear(&self) -> FxResult<()> {
            if self.fail_clear.load(Ordering::SeqCst) {
                return Err(RatewatchError::Store("wipe refused".into()));
            }
            self.inner.clear().await
        }

        async fn put(&self, snapshot: RateSnapshot) -> FxResult<()> {
            if *self.fail_put.lock() == Some(snapshot.name) {
                return Err(RatewatchError::Store(format!("{} write refused", snapshot.name)));
            }
            self.inner.put(snapshot).await
        }

        async fn get(&self, name: SnapshotName) -> FxResult<Option<RateSnapshot>> {
            self.inner.get(name).await
        }
    }

    fn rates() -> RateTable {
        RateTable::new().with_rate("NOK", 10.0).with_rate("USD", 1.25)
    }

    fn cycle(provider: Arc<MockRateProvider>, store: Arc<dyn RateStore>) -> RateRefreshCycle {
        RateRefreshCycle::new(provider, store, Currency::eur(), RateAggregator::new(7))
    }

    #[tokio::test]
    async fn test_refresh_writes_both_snapshots() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());

        let outcome = cycle(provider.clone(), store.clone()).refresh().await.unwrap();

        assert_eq!(outcome.latest.name, SnapshotName::Latest);
        assert_eq!(outcome.average.name, SnapshotName::Average);
        assert_eq!(outcome.latest.rates.get(&Currency::eur()), Some(1.0));
        assert_eq!(outcome.average.rates.get(&Currency::eur()), Some(1.0));
        assert_eq!(outcome.average.rates.get(&Currency::nok()), Some(10.0));
        assert_eq!(store.len(), 2);
        // one latest fetch, then the seven-day window
        assert_eq!(provider.calls(), 8);
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_snapshots() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());
        let cycle = cycle(provider.clone(), store.clone());

        cycle.refresh().await.unwrap();
        provider.set_fallback(RateTable::new().with_rate("SEK", 11.0));
        cycle.refresh().await.unwrap();

        let latest = store.get(SnapshotName::Latest).await.unwrap().unwrap();
        assert!(!latest.rates.contains(&Currency::nok()));
        assert_eq!(latest.rates.get(&Currency::new("SEK")), Some(11.0));
    }

    #[tokio::test]
    async fn test_failed_wipe_skips_provider() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(FlakyStore::default());
        store.fail_clear.store(true, Ordering::SeqCst);

        let result = cycle(provider.clone(), store).refresh().await;

        assert!(matches!(result, Err(RatewatchError::Store(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_average_keeps_latest_readable() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());
        provider.fail_history(true);

        let result = cycle(provider, store.clone()).refresh().await;
        assert!(matches!(result, Err(RatewatchError::Fetch(_))));

        let lookup = RateLookup::new(store);
        assert_eq!(
            lookup.latest(&Currency::eur(), &Currency::nok()).await.unwrap(),
            10.0
        );
        assert_eq!(
            lookup.average(&Currency::eur(), &Currency::nok()).await.unwrap_err(),
            RatewatchError::SnapshotNotFound(SnapshotName::Average)
        );
    }

    #[tokio::test]
    async fn test_failed_latest_leaves_store_empty() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());
        let cycle = cycle(provider.clone(), store.clone());
        cycle.refresh().await.unwrap();

        provider.fail_on(None);
        assert!(cycle.refresh().await.is_err());

        assert!(store.is_empty());
        let err = RateLookup::new(store)
            .latest(&Currency::eur(), &Currency::nok())
            .await
            .unwrap_err();
        assert_eq!(err, RatewatchError::SnapshotNotFound(SnapshotName::Latest));
    }

    #[tokio::test]
    async fn test_failed_average_write() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(FlakyStore::default());
        *store.fail_put.lock() = Some(SnapshotName::Average);

        let result = cycle(provider, store.clone()).refresh().await;

        assert!(matches!(result, Err(RatewatchError::Store(_))));
        assert!(store.get(SnapshotName::Latest).await.unwrap().is_some());
        assert!(store.get(SnapshotName::Average).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_refresh_rejected() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());
        let cycle = cycle(provider, store);

        let guard = cycle.in_flight.lock().await;
        assert!(cycle.is_running());
        assert_eq!(
            cycle.refresh().await.unwrap_err(),
            RatewatchError::RefreshInProgress
        );

        drop(guard);
        assert!(!cycle.is_running());
        assert!(cycle.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_function() {
        let provider = Arc::new(MockRateProvider::constant("test", rates()));
        let store = Arc::new(InMemoryRateStore::new());

        let outcome = refresh(provider, store, Currency::eur()).await.unwrap();
        assert_eq!(outcome.average.rates.get(&Currency::usd()), Some(1.25));
    }
}
