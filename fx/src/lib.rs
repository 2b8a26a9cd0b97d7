//! Ratewatch FX Pipeline
//!
//! Rate ingestion for ratewatch: fetching rate tables from a remote
//! provider, computing trailing averages, and keeping the "latest" and
//! "average" snapshots in a store.
//!
//! # Features
//!
//! - Provider abstraction with an HTTP implementation
//! - Concurrent trailing-average computation with a configurable policy for
//!   currencies missing from individual days
//! - Snapshot stores (in-memory and Postgres) behind one trait
//! - Single-flight refresh cycles
//! - Cross-rate lookups with explicit "not yet refreshed" errors
//!
//! # Example
//!
//! ```rust,ignore
//! use ratewatch_fx::{HttpRateProvider, InMemoryRateStore, RateAggregator, RateLookup, RateRefreshCycle};
//! use ratewatch_common::Currency;
//!
//! let provider = Arc::new(HttpRateProvider::new("https://api.exchangeratesapi.io")?);
//! let store = Arc::new(InMemoryRateStore::new());
//! let cycle = RateRefreshCycle::new(provider, store.clone(), Currency::eur(), RateAggregator::default());
//!
//! cycle.refresh().await?;
//! let nok_per_usd = RateLookup::new(store).latest(&Currency::usd(), &Currency::nok()).await?;
//! ```

pub mod aggregator;
pub mod error;
pub mod lookup;
pub mod provider;
pub mod refresh;
pub mod store;

pub use aggregator::{compute_trailing_average, AveragePolicy, RateAggregator};
pub use error::FxResult;
pub use lookup::RateLookup;
pub use provider::{HttpRateProvider, RateProvider};
pub use refresh::{refresh, RateRefreshCycle, RefreshOutcome};
pub use store::{InMemoryRateStore, PgRateStore, RateStore};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
