//! Rate provider traits and implementations.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ratewatch_common::{constants, format_date, Currency, RateTable, RatewatchError};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{fetch_error, FxResult};

/// Trait for FX rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the rate table for `base`.
    ///
    /// `None` asks for the latest rates, `Some(date)` for that day's
    /// published rates.
    async fn fetch(&self, base: &Currency, date: Option<NaiveDate>) -> FxResult<RateTable>;
}

/// Body returned by the provider's `/latest` and `/<date>` endpoints.
#[derive(Debug, Deserialize)]
struct ProviderPayload {
    #[serde(default)]
    base: Option<Currency>,
    rates: RateTable,
}

/// Provider backed by an exchangeratesapi-style HTTP API.
pub struct HttpRateProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateProvider {
    /// Create a provider with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> FxResult<Self> {
        Self::with_timeout(base_url, constants::default_http_timeout())
    }

    /// Create a provider with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RatewatchError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a provider that shares an existing client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, date: Option<NaiveDate>) -> String {
        match date {
            Some(date) => format!("{}/{}", self.base_url, format_date(date)),
            None => format!("{}/latest", self.base_url),
        }
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    fn name(&self) -> &str {
        "HTTP"
    }

    #[instrument(skip(self, base), fields(base = %base))]
    async fn fetch(&self, base: &Currency, date: Option<NaiveDate>) -> FxResult<RateTable> {
        let url = self.url_for(date);

        let response = self
            .client
            .get(&url)
            .query(&[("base", base.code())])
            .send()
            .await
            .map_err(|e| fetch_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(&url, format!("provider returned {status}")));
        }

        let body = response.text().await.map_err(|e| fetch_error(&url, e))?;
        let payload: ProviderPayload = serde_json::from_str(&body)
            .map_err(|e| fetch_error(&url, format!("malformed payload: {e}")))?;

        if let Some(reported) = &payload.base {
            if reported != base {
                return Err(fetch_error(
                    &url,
                    format!("asked for base {base}, provider answered with {reported}"),
                ));
            }
        }

        if let Some((currency, rate)) = payload.rates.iter().find(|(_, r)| !r.is_finite() || *r < 0.0) {
            return Err(fetch_error(&url, format!("invalid rate {rate} for {currency}")));
        }

        let mut rates = payload.rates;
        rates.pin_base(base);

        debug!(url = %url, currencies = rates.len(), "Fetched rate table");
        Ok(rates)
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    tables: dashmap::DashMap<Option<NaiveDate>, RateTable>,
    fallback: parking_lot::RwLock<Option<RateTable>>,
    failing: dashmap::DashSet<Option<NaiveDate>>,
    failing_history: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider with no rates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: dashmap::DashMap::new(),
            fallback: parking_lot::RwLock::new(None),
            failing: dashmap::DashSet::new(),
            failing_history: std::sync::atomic::AtomicBool::new(false),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a provider answering every request with the same table.
    pub fn constant(name: impl Into<String>, table: RateTable) -> Self {
        let provider = Self::new(name);
        provider.set_fallback(table);
        provider
    }

    /// Set the table returned for the latest rates.
    pub fn set_latest(&self, table: RateTable) {
        self.tables.insert(None, table);
    }

    /// Set the table returned for a historical day.
    pub fn set_day(&self, date: NaiveDate, table: RateTable) {
        self.tables.insert(Some(date), table);
    }

    /// Set the table returned when nothing more specific is configured.
    pub fn set_fallback(&self, table: RateTable) {
        *self.fallback.write() = Some(table);
    }

    /// Make requests for `date` (or latest, for `None`) fail.
    pub fn fail_on(&self, date: Option<NaiveDate>) {
        self.failing.insert(date);
    }

    /// Stop failing requests for `date`.
    pub fn recover(&self, date: Option<NaiveDate>) {
        self.failing.remove(&date);
    }

    /// Make every historical request fail, whatever its date. Latest rates
    /// are still served.
    pub fn fail_history(&self, failing: bool) {
        self.failing_history
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of fetches served or refused so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _base: &Currency, date: Option<NaiveDate>) -> FxResult<RateTable> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let label = date.map(format_date).unwrap_or_else(|| "latest".to_string());
        let history_down =
            date.is_some() && self.failing_history.load(std::sync::atomic::Ordering::SeqCst);
        if history_down || self.failing.contains(&date) {
            return Err(RatewatchError::Fetch(format!("{}: {label} unavailable", self.name)));
        }

        if let Some(table) = self.tables.get(&date) {
            return Ok(table.clone());
        }

        self.fallback
            .read()
            .clone()
            .ok_or_else(|| RatewatchError::Fetch(format!("{}: no rates for {label}", self.name)))
    }
}
