//! Rate tables and named snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{RatewatchError, Result, SnapshotName};

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Check the code looks like an ISO 4217 alphabetic code.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_alphabetic())
    }

    /// Common currencies
    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn nok() -> Self {
        Self::new("NOK")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

/// A currency pair, priced as units of `quote` per one unit of `base`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Rates for many currencies, all relative to one base currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable(BTreeMap<Currency, f64>);

impl RateTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the rate for a currency, replacing any previous value.
    pub fn insert(&mut self, currency: Currency, rate: f64) {
        self.0.insert(currency, rate);
    }

    /// Builder form of [`RateTable::insert`].
    pub fn with_rate(mut self, currency: impl Into<Currency>, rate: f64) -> Self {
        self.insert(currency.into(), rate);
        self
    }

    /// Get the rate for a currency.
    pub fn get(&self, currency: &Currency) -> Option<f64> {
        self.0.get(currency).copied()
    }

    /// Check whether a currency is present.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.0.contains_key(currency)
    }

    /// Remove a currency.
    pub fn remove(&mut self, currency: &Currency) -> Option<f64> {
        self.0.remove(currency)
    }

    /// Pin the base currency at exactly 1.
    pub fn pin_base(&mut self, base: &Currency) {
        self.0.insert(base.clone(), 1.0);
    }

    /// Number of currencies in the table.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over currencies and rates in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, f64)> {
        self.0.iter().map(|(c, r)| (c, *r))
    }

    /// Currencies present in the table.
    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.0.keys()
    }

    /// Price of one unit of `from` expressed in `to`.
    ///
    /// Both rates are relative to the same base, so the cross rate is
    /// `rates[to] / rates[from]`.
    pub fn cross_rate(&self, from: &Currency, to: &Currency) -> Result<f64> {
        let from_rate = self
            .get(from)
            .ok_or_else(|| RatewatchError::InvalidCurrency(from.clone()))?;
        let to_rate = self
            .get(to)
            .ok_or_else(|| RatewatchError::InvalidCurrency(to.clone()))?;

        if from_rate == 0.0 {
            return Err(RatewatchError::DivisionByZero {
                currency: from.clone(),
            });
        }

        Ok(to_rate / from_rate)
    }
}

impl FromIterator<(Currency, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (Currency, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A named, wholesale-replaced rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Storage key.
    pub name: SnapshotName,
    /// Currency every rate is relative to.
    pub base: Currency,
    /// The rates, with `base` pinned at 1.
    pub rates: RateTable,
    /// When the snapshot was produced.
    pub taken_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// Create a snapshot, pinning the base currency at 1.
    pub fn new(name: SnapshotName, base: Currency, mut rates: RateTable) -> Self {
        rates.pin_base(&base);
        Self {
            name,
            base,
            rates,
            taken_at: Utc::now(),
        }
    }

    /// Cross rate between two currencies in this snapshot.
    pub fn rate(&self, from: &Currency, to: &Currency) -> Result<f64> {
        self.rates.cross_rate(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_table() -> RateTable {
        RateTable::new()
            .with_rate("EUR", 1.0)
            .with_rate("NOK", 10.0)
            .with_rate("USD", 1.25)
    }

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new(" nok "), Currency::nok());
        assert!(Currency::eur().is_well_formed());
        assert!(!Currency::new("EURO").is_well_formed());
        assert!(!Currency::new("").is_well_formed());
    }

    #[test]
    fn test_cross_rate() {
        let table = sample_table();
        assert_eq!(table.cross_rate(&Currency::eur(), &Currency::nok()).unwrap(), 10.0);
        assert_eq!(table.cross_rate(&Currency::usd(), &Currency::nok()).unwrap(), 8.0);
        assert_eq!(table.cross_rate(&Currency::nok(), &Currency::nok()).unwrap(), 1.0);
    }

    #[test]
    fn test_cross_rate_unknown_currency() {
        let table = sample_table();
        let err = table
            .cross_rate(&Currency::eur(), &Currency::new("SEK"))
            .unwrap_err();
        assert_eq!(err, RatewatchError::InvalidCurrency(Currency::new("SEK")));
    }

    #[test]
    fn test_cross_rate_zero_source() {
        let table = sample_table().with_rate("ZZZ", 0.0);
        let err = table
            .cross_rate(&Currency::new("ZZZ"), &Currency::eur())
            .unwrap_err();
        assert!(matches!(err, RatewatchError::DivisionByZero { .. }));
    }

    #[test]
    fn test_snapshot_pins_base() {
        let rates = RateTable::new().with_rate("EUR", 0.9999).with_rate("NOK", 10.0);
        let snapshot = RateSnapshot::new(SnapshotName::Latest, Currency::eur(), rates);
        assert_eq!(snapshot.rates.get(&Currency::eur()), Some(1.0));

        let rates = RateTable::new().with_rate("NOK", 10.0);
        let snapshot = RateSnapshot::new(SnapshotName::Latest, Currency::eur(), rates);
        assert_eq!(snapshot.rates.get(&Currency::eur()), Some(1.0));
    }

    #[test]
    fn test_rate_table_json_shape() {
        let json = serde_json::to_value(sample_table()).unwrap();
        assert_eq!(json["NOK"], 10.0);

        let parsed: RateTable = serde_json::from_str(r#"{"nok": 10.5, "EUR": 1}"#).unwrap();
        assert_eq!(parsed.get(&Currency::nok()), Some(10.5));
    }

    proptest! {
        #[test]
        fn prop_inverse_consistency(a in 0.001f64..10_000.0, b in 0.001f64..10_000.0) {
            let table = RateTable::new()
                .with_rate("EUR", 1.0)
                .with_rate("AAA", a)
                .with_rate("BBB", b);
            let x = Currency::new("AAA");
            let y = Currency::new("BBB");

            let forward = table.cross_rate(&x, &y).unwrap();
            let backward = table.cross_rate(&y, &x).unwrap();

            prop_assert!((forward - 1.0 / backward).abs() <= 1e-9 * forward.abs().max(1.0));
        }
    }
}
