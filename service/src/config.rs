//! Service configuration.

use std::str::FromStr;
use std::time::Duration;

use ratewatch_common::{constants, Currency};
use ratewatch_fx::AveragePolicy;

/// Where snapshots and subscriptions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// Postgres at `database_url`.
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => Err(format!("Unknown storage backend: {other}")),
        }
    }
}

/// Provider and averaging configuration.
#[derive(Debug, Clone)]
pub struct RatesConfig {
    /// Base URL of the exchange rate API.
    pub provider_url: String,
    /// Currency every snapshot is expressed in.
    pub base_currency: Currency,
    /// Length of the trailing average window.
    pub average_days: u32,
    /// Handling of currencies missing from some days.
    pub average_policy: AveragePolicy,
    /// Timeout for provider requests.
    pub http_timeout: Duration,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            provider_url: "https://api.exchangeratesapi.io".to_string(),
            base_currency: Currency::eur(),
            average_days: constants::DEFAULT_AVERAGE_DAYS,
            average_policy: AveragePolicy::default(),
            http_timeout: constants::default_http_timeout(),
        }
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Per-delivery timeout.
    pub timeout: Duration,
    /// Maximum deliveries in flight.
    pub concurrency: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: constants::default_webhook_timeout(),
            concurrency: 16,
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Rates configuration.
    pub rates: RatesConfig,
    /// Webhook configuration.
    pub webhooks: WebhookConfig,
    /// Time between refresh cycles.
    pub refresh_interval: Duration,
    /// Storage backend.
    pub storage: StorageBackend,
    /// Database URL, required for postgres storage.
    pub database_url: Option<String>,
    /// Log level.
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rates: RatesConfig::default(),
            webhooks: WebhookConfig::default(),
            refresh_interval: constants::default_refresh_interval(),
            storage: StorageBackend::default(),
            database_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from environment variables.
    pub fn load() -> Result<Self, String> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from an arbitrary key lookup.
    pub fn load_from<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::from_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults. A set key that fails to parse is an
    /// error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("RATEWATCH_PROVIDER_URL") {
            config.rates.provider_url = url;
        }

        if let Some(base) = lookup("RATEWATCH_BASE_CURRENCY") {
            config.rates.base_currency = Currency::new(base);
        }

        if let Some(days) = lookup("RATEWATCH_AVERAGE_DAYS") {
            config.rates.average_days = parse("RATEWATCH_AVERAGE_DAYS", &days)?;
        }

        if let Some(policy) = lookup("RATEWATCH_AVERAGE_POLICY") {
            config.rates.average_policy = policy.parse().map_err(|e| format!("{e}"))?;
        }

        if let Some(ms) = lookup("RATEWATCH_HTTP_TIMEOUT_MS") {
            config.rates.http_timeout =
                Duration::from_millis(parse("RATEWATCH_HTTP_TIMEOUT_MS", &ms)?);
        }

        if let Some(secs) = lookup("RATEWATCH_REFRESH_INTERVAL_SECS") {
            config.refresh_interval =
                Duration::from_secs(parse("RATEWATCH_REFRESH_INTERVAL_SECS", &secs)?);
        }

        if let Some(storage) = lookup("RATEWATCH_STORAGE") {
            config.storage = storage.parse()?;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = Some(url);
        }

        if let Some(ms) = lookup("RATEWATCH_WEBHOOK_TIMEOUT_MS") {
            config.webhooks.timeout =
                Duration::from_millis(parse("RATEWATCH_WEBHOOK_TIMEOUT_MS", &ms)?);
        }

        if let Some(n) = lookup("RATEWATCH_WEBHOOK_CONCURRENCY") {
            config.webhooks.concurrency = parse("RATEWATCH_WEBHOOK_CONCURRENCY", &n)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.rates.provider_url.trim().is_empty() {
            return Err("Provider URL cannot be empty".to_string());
        }

        if !self.rates.base_currency.is_well_formed() {
            return Err(format!(
                "Base currency must be a 3-letter code, got {}",
                self.rates.base_currency
            ));
        }

        if self.rates.average_days == 0 {
            return Err("Average window must be at least one day".to_string());
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be 0".to_string());
        }

        if self.webhooks.concurrency == 0 {
            return Err("Webhook concurrency cannot be 0".to_string());
        }

        if self.storage == StorageBackend::Postgres
            && self.database_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err("Postgres storage requires DATABASE_URL".to_string());
        }

        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid value for {key}: {value}"))
}
