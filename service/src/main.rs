//! Ratewatch Binary
//!
//! Refreshes exchange rates on a timer and notifies webhook subscribers whose
//! trigger band contains the latest rate.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratewatch_fx::{HttpRateProvider, InMemoryRateStore, PgRateStore, RateStore};
use ratewatch_notifier::{PgRegistry, SubscriberRegistry, VolatileRegistry};
use ratewatch_service::{ServiceConfig, StorageBackend, Watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .or_else(|_| std::env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ratewatch");

    // Load configuration
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(anyhow::anyhow!("Configuration error: {}", e));
        }
    };

    let provider = Arc::new(HttpRateProvider::with_timeout(
        config.rates.provider_url.clone(),
        config.rates.http_timeout,
    )?);

    let (store, registry): (Arc<dyn RateStore>, Arc<dyn SubscriberRegistry>) = match config.storage {
        StorageBackend::Memory => (
            Arc::new(InMemoryRateStore::new()),
            Arc::new(VolatileRegistry::new()),
        ),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for postgres storage"))?;

            let store = PgRateStore::connect(url).await?;
            store.ensure_schema().await?;
            let registry = PgRegistry::connect(url).await?;
            registry.ensure_schema().await?;

            (Arc::new(store), Arc::new(registry))
        }
    };

    info!(
        provider = %config.rates.provider_url,
        base = %config.rates.base_currency,
        average_days = config.rates.average_days,
        average_policy = %config.rates.average_policy,
        store = store.name(),
        registry = registry.name(),
        log_level = %config.log_level,
        "Backends ready"
    );

    let watcher = Arc::new(Watcher::new(&config, provider, store, registry)?);
    let handle = watcher.start()?;

    // Set up graceful shutdown
    let watcher_clone = watcher.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Shutdown signal received");
        watcher_clone.stop();
    });

    handle.await?;

    info!(metrics = ?watcher.metrics().snapshot(), "Ratewatch shutdown complete");
    Ok(())
}
