//! Snapshot storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ratewatch_common::{Currency, RateSnapshot, RateTable, SnapshotName};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use crate::error::{store_error, FxResult};

/// Storage for named rate snapshots.
///
/// Snapshots are replaced wholesale; a store never merges rate tables.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Get the store name.
    fn name(&self) -> &str;

    /// Remove every stored snapshot.
    async fn clear(&self) -> FxResult<()>;

    /// Insert or replace the snapshot stored under `snapshot.name`.
    async fn put(&self, snapshot: RateSnapshot) -> FxResult<()>;

    /// Read a snapshot. `None` means it has not been written since the last
    /// wipe.
    async fn get(&self, name: SnapshotName) -> FxResult<Option<RateSnapshot>>;
}

/// Process-local snapshot store.
#[derive(Default)]
pub struct InMemoryRateStore {
    snapshots: DashMap<SnapshotName, RateSnapshot>,
}

impl InMemoryRateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots currently held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn clear(&self) -> FxResult<()> {
        self.snapshots.clear();
        Ok(())
    }

    async fn put(&self, snapshot: RateSnapshot) -> FxResult<()> {
        debug!(snapshot = %snapshot.name, currencies = snapshot.rates.len(), "Storing snapshot");
        self.snapshots.insert(snapshot.name, snapshot);
        Ok(())
    }

    async fn get(&self, name: SnapshotName) -> FxResult<Option<RateSnapshot>> {
        Ok(self.snapshots.get(&name).map(|s| s.clone()))
    }
}

/// Postgres-backed snapshot store.
///
/// One row per snapshot name in `rate_snapshots`; the rate table is kept as
/// a JSONB document.
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Connect to the database at `url`.
    pub async fn connect(url: &str) -> FxResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| store_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Use an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the snapshot table if it is missing.
    pub async fn ensure_schema(&self) -> FxResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rate_snapshots (
                name TEXT PRIMARY KEY,
                base TEXT NOT NULL,
                rates JSONB NOT NULL,
                taken_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("create rate_snapshots", e))?;

        info!("Rate snapshot schema ready");
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn clear(&self) -> FxResult<()> {
        sqlx::query("DELETE FROM rate_snapshots")
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("wipe rate_snapshots", e))?;
        Ok(())
    }

    async fn put(&self, snapshot: RateSnapshot) -> FxResult<()> {
        sqlx::query(
            "INSERT INTO rate_snapshots (name, base, rates, taken_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO UPDATE
             SET base = EXCLUDED.base, rates = EXCLUDED.rates, taken_at = EXCLUDED.taken_at",
        )
        .bind(snapshot.name.as_str())
        .bind(snapshot.base.code())
        .bind(Json(&snapshot.rates))
        .bind(snapshot.taken_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(format!("write {} snapshot", snapshot.name), e))?;
        Ok(())
    }

    async fn get(&self, name: SnapshotName) -> FxResult<Option<RateSnapshot>> {
        let row: Option<(String, Json<RateTable>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT base, rates, taken_at FROM rate_snapshots WHERE name = $1",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error(format!("read {name} snapshot"), e))?;

        Ok(row.map(|(base, Json(rates), taken_at)| RateSnapshot {
            name,
            base: Currency::new(base),
            rates,
            taken_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: SnapshotName, nok: f64) -> RateSnapshot {
        RateSnapshot::new(name, Currency::eur(), RateTable::new().with_rate("NOK", nok))
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryRateStore::new();
        store.put(snapshot(SnapshotName::Latest, 10.0)).await.unwrap();

        let latest = store.get(SnapshotName::Latest).await.unwrap().unwrap();
        assert_eq!(latest.rates.get(&Currency::nok()), Some(10.0));
        assert!(store.get(SnapshotName::Average).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_not_merges() {
        let store = InMemoryRateStore::new();
        let first = RateSnapshot::new(
            SnapshotName::Latest,
            Currency::eur(),
            RateTable::new().with_rate("NOK", 10.0).with_rate("SEK", 11.0),
        );
        store.put(first).await.unwrap();
        store.put(snapshot(SnapshotName::Latest, 12.0)).await.unwrap();

        let latest = store.get(SnapshotName::Latest).await.unwrap().unwrap();
        assert_eq!(latest.rates.get(&Currency::nok()), Some(12.0));
        assert!(!latest.rates.contains(&Currency::new("SEK")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryRateStore::new();
        store.put(snapshot(SnapshotName::Latest, 10.0)).await.unwrap();
        store.put(snapshot(SnapshotName::Average, 9.0)).await.unwrap();
        assert_eq!(store.len(), 2);

        store.clear().await.unwrap();

        assert!(store.is_empty());
        assert!(store.get(SnapshotName::Latest).await.unwrap().is_none());
    }
}
