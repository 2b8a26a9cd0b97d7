//! The watcher: refresh, evaluate and notify on a timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use ratewatch_common::{RatewatchError, Result, SnapshotName};
use ratewatch_fx::{
    RateAggregator, RateLookup, RateProvider, RateRefreshCycle, RateStore, RefreshOutcome,
};
use ratewatch_notifier::{
    DispatchReport, DispatcherConfig, SkippedSubscriber, SubscriberRegistry, TriggerEvaluator,
    WebhookDispatcher,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::ServiceConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::state::WatcherState;

/// What one full cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// The refresh that opened the cycle.
    pub refresh: RefreshOutcome,
    /// Subscribers evaluated.
    pub evaluated: usize,
    /// Subscribers left out because their pair could not be priced.
    pub skipped: Vec<SkippedSubscriber>,
    /// Subscribers priced but outside their band.
    pub out_of_band: usize,
    /// Webhook delivery results for the subscribers that fired.
    pub dispatch: DispatchReport,
}

impl CycleReport {
    /// Number of subscribers that fired.
    pub fn triggered(&self) -> usize {
        self.dispatch.attempted()
    }
}

/// Drives refresh, trigger evaluation and webhook delivery.
///
/// Subscribers are evaluated against the "latest" snapshot after every
/// successful refresh. A failed refresh skips evaluation for that cycle.
pub struct Watcher {
    refresher: Arc<RateRefreshCycle>,
    lookup: RateLookup,
    registry: Arc<dyn SubscriberRegistry>,
    evaluator: TriggerEvaluator,
    dispatcher: WebhookDispatcher,
    metrics: SharedMetrics,
    interval: Duration,
    state: Arc<RwLock<WatcherState>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Watcher {
    /// Build a watcher from its configuration and backends.
    pub fn new(
        config: &ServiceConfig,
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        registry: Arc<dyn SubscriberRegistry>,
    ) -> Result<Self> {
        let aggregator = RateAggregator::new(config.rates.average_days)
            .with_policy(config.rates.average_policy);
        let refresher = Arc::new(RateRefreshCycle::new(
            provider,
            store.clone(),
            config.rates.base_currency.clone(),
            aggregator,
        ));
        let dispatcher = WebhookDispatcher::new(DispatcherConfig {
            timeout: config.webhooks.timeout,
            concurrency: config.webhooks.concurrency,
            ..Default::default()
        })?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            refresher,
            lookup: RateLookup::new(store),
            registry,
            evaluator: TriggerEvaluator::new(),
            dispatcher,
            metrics: Arc::new(Metrics::new()),
            interval: config.refresh_interval,
            state: Arc::new(RwLock::new(WatcherState::Starting)),
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        })
    }

    /// Get the current watcher state.
    pub fn state(&self) -> WatcherState {
        *self.state.read()
    }

    /// Shared metrics.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Lookups against the snapshots this watcher maintains.
    pub fn lookup(&self) -> &RateLookup {
        &self.lookup
    }

    /// The subscriber registry this watcher notifies.
    pub fn registry(&self) -> &Arc<dyn SubscriberRegistry> {
        &self.registry
    }

    /// Run one refresh, then evaluate and notify every subscriber.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let state = self.state();
        if !state.accepts_cycles() {
            return Err(RatewatchError::NotRunning(format!("{state:?}")));
        }

        self.metrics.refresh_started();

        let refresh = match self.refresher.refresh().await {
            Ok(outcome) => {
                self.metrics.refresh_succeeded();
                outcome
            }
            Err(RatewatchError::RefreshInProgress) => {
                self.metrics.refresh_rejected();
                return Err(RatewatchError::RefreshInProgress);
            }
            Err(e) => {
                self.metrics.refresh_failed();
                warn!(error = %e, "Refresh failed, skipping evaluation");
                return Err(e);
            }
        };

        let snapshot = self.lookup.snapshot(SnapshotName::Latest).await?;
        let subscribers = self.registry.list().await?;

        let evaluation = self.evaluator.evaluate_detailed(&snapshot, &subscribers);
        self.metrics
            .record_evaluation(evaluation.triggered.len(), evaluation.skipped.len());

        let dispatch = self.dispatcher.dispatch_batch(&evaluation.triggered).await;
        self.metrics
            .record_deliveries(dispatch.delivered.len(), dispatch.failures.len());

        info!(
            cycle_id = %refresh.cycle_id,
            evaluated = subscribers.len(),
            triggered = evaluation.triggered.len(),
            skipped = evaluation.skipped.len(),
            delivered = dispatch.delivered.len(),
            failed = dispatch.failures.len(),
            "Cycle completed"
        );

        Ok(CycleReport {
            refresh,
            evaluated: subscribers.len(),
            skipped: evaluation.skipped,
            out_of_band: evaluation.out_of_band,
            dispatch,
        })
    }

    /// Start the cycle loop on a background task.
    ///
    /// The first cycle runs immediately, then once per refresh interval.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        let shutdown_rx = self.take_shutdown_rx()?;
        *self.state.write() = WatcherState::Running;
        info!(interval_secs = self.interval.as_secs(), "Starting watcher");

        let watcher = self.clone();
        Ok(tokio::spawn(async move {
            watcher.run_loop(shutdown_rx).await;
        }))
    }

    /// Run the cycle loop on the current task until [`Watcher::stop`] is
    /// called.
    pub async fn run(&self) -> Result<()> {
        let shutdown_rx = self.take_shutdown_rx()?;
        *self.state.write() = WatcherState::Running;
        self.run_loop(shutdown_rx).await;
        Ok(())
    }

    /// Stop the watcher after its current cycle.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if self.state().is_terminal() {
            return;
        }
        info!("Stopping watcher");

        if self.shutdown_rx.lock().take().is_some() {
            // loop never started
            *self.state.write() = WatcherState::Stopped;
            return;
        }

        *self.state.write() = WatcherState::ShuttingDown;
        let _ = self.shutdown_tx.try_send(());
    }

    fn take_shutdown_rx(&self) -> Result<mpsc::Receiver<()>> {
        self.shutdown_rx.lock().take().ok_or_else(|| {
            RatewatchError::Configuration("watcher loop already started".to_string())
        })
    }

    async fn run_loop(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(error = %e, "Cycle aborted");
                    }
                }
            }
        }

        *self.state.write() = WatcherState::Stopped;
        info!("Watcher stopped");
    }
}
