//! Trailing-average computation over daily rate tables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use futures::future::try_join_all;
use ratewatch_common::{
    constants, format_date, today, trailing_window, Currency, RateTable, RatewatchError,
};
use tracing::{debug, instrument, warn};

use crate::error::FxResult;
use crate::provider::RateProvider;

/// How to treat a currency that is missing from some days of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AveragePolicy {
    /// Sum the days the currency appears in and still divide by the window
    /// length.
    #[default]
    Lenient,
    /// Drop the currency from the average.
    Exclude,
    /// Fail the whole average.
    Strict,
}

impl AveragePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AveragePolicy::Lenient => "lenient",
            AveragePolicy::Exclude => "exclude",
            AveragePolicy::Strict => "strict",
        }
    }
}

impl fmt::Display for AveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AveragePolicy {
    type Err = RatewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(AveragePolicy::Lenient),
            "exclude" => Ok(AveragePolicy::Exclude),
            "strict" => Ok(AveragePolicy::Strict),
            other => Err(RatewatchError::Configuration(format!(
                "unknown average policy: {other}"
            ))),
        }
    }
}

/// Computes trailing averages from a rate provider.
#[derive(Debug, Clone)]
pub struct RateAggregator {
    days: u32,
    policy: AveragePolicy,
}

impl RateAggregator {
    /// Create an aggregator over a window of `days` days.
    pub fn new(days: u32) -> Self {
        Self {
            days,
            policy: AveragePolicy::default(),
        }
    }

    /// Set the missing-currency policy.
    pub fn with_policy(mut self, policy: AveragePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn policy(&self) -> AveragePolicy {
        self.policy
    }

    /// Average over the window ending today.
    pub async fn compute_trailing_average(
        &self,
        provider: &dyn RateProvider,
        base: &Currency,
    ) -> FxResult<RateTable> {
        self.compute_for_window(provider, base, today()).await
    }

    /// Average over the window ending on `end`.
    ///
    /// The first day is fetched as the provider's latest table; every
    /// earlier day by date. Fetches run concurrently but are summed in window
    /// order, so the result does not depend on which request finishes first.
    #[instrument(skip(self, provider, base), fields(base = %base, days = self.days, policy = %self.policy))]
    pub async fn compute_for_window(
        &self,
        provider: &dyn RateProvider,
        base: &Currency,
        end: NaiveDate,
    ) -> FxResult<RateTable> {
        if self.days == 0 {
            return Err(RatewatchError::invalid_field(
                "days",
                "trailing window must cover at least one day",
            ));
        }

        let window = trailing_window(end, self.days);
        let fetches = window.iter().enumerate().map(|(offset, &date)| async move {
            let request = if offset == 0 { None } else { Some(date) };
            let table = provider.fetch(base, request).await?;
            debug!(date = %format_date(date), currencies = table.len(), "Fetched daily rates");
            Ok::<_, RatewatchError>((date, table))
        });

        let samples = try_join_all(fetches).await?;
        self.average(base, &samples)
    }

    /// Average already-fetched daily tables.
    pub fn average(&self, base: &Currency, samples: &[(NaiveDate, RateTable)]) -> FxResult<RateTable> {
        if samples.is_empty() {
            return Err(RatewatchError::invalid_field(
                "days",
                "trailing window must cover at least one day",
            ));
        }

        let mut sums: BTreeMap<&Currency, (f64, usize)> = BTreeMap::new();
        for (_, table) in samples {
            for (currency, rate) in table.iter() {
                let entry = sums.entry(currency).or_insert((0.0, 0));
                entry.0 += rate;
                entry.1 += 1;
            }
        }

        let window = samples.len();
        let mut averaged = RateTable::new();

        for (currency, (sum, seen)) in sums {
            if seen < window && currency != base {
                match self.policy {
                    AveragePolicy::Lenient => {
                        debug!(currency = %currency, seen, window, "Currency missing from part of the window");
                    }
                    AveragePolicy::Exclude => {
                        warn!(currency = %currency, seen, window, "Excluding currency from average");
                        continue;
                    }
                    AveragePolicy::Strict => {
                        let missing = samples
                            .iter()
                            .find(|(_, table)| !table.contains(currency))
                            .map(|(date, _)| format_date(*date))
                            .unwrap_or_default();
                        return Err(RatewatchError::Fetch(format!(
                            "{currency} missing from rates for {missing}"
                        )));
                    }
                }
            }

            averaged.insert(currency.clone(), sum / window as f64);
        }

        averaged.pin_base(base);
        Ok(averaged)
    }
}

impl Default for RateAggregator {
    fn default() -> Self {
        Self::new(constants::DEFAULT_AVERAGE_DAYS)
    }
}

/// Average the trailing `days` days of rates for `base`.
pub async fn compute_trailing_average(
    provider: &dyn RateProvider,
    base: &Currency,
    days: u32,
) -> FxResult<RateTable> {
    RateAggregator::new(days)
        .compute_trailing_average(provider, base)
        .await
}
