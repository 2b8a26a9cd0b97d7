//! Subscriber registry.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use ratewatch_common::{Currency, NewSubscriber, RatewatchError, Result, Subscriber, SubscriberId};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

/// CRUD store of webhook subscriptions.
///
/// Records are validated on `create` and never mutated afterwards. Ids are
/// assigned by the registry and are not reused after deletion.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Get the registry name.
    fn name(&self) -> &str;

    /// Validate and store a subscription, returning its new id.
    async fn create(&self, subscriber: NewSubscriber) -> Result<SubscriberId>;

    /// Read a subscription.
    async fn get(&self, id: SubscriberId) -> Result<Subscriber>;

    /// All subscriptions, ordered by id.
    async fn list(&self) -> Result<Vec<Subscriber>>;

    /// Remove a subscription.
    async fn delete(&self, id: SubscriberId) -> Result<()>;

    /// Parse a JSON registration body and store it.
    async fn register(&self, body: &str) -> Result<SubscriberId> {
        let subscriber = NewSubscriber::from_json(body)?;
        self.create(subscriber).await
    }
}

/// Process-local registry, used for tests and single-node deployments that
/// can afford to lose subscriptions on restart.
pub struct VolatileRegistry {
    subscribers: DashMap<SubscriberId, Subscriber>,
    next_id: AtomicU64,
}

impl VolatileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(SubscriberId::FIRST.value()),
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Default for VolatileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriberRegistry for VolatileRegistry {
    fn name(&self) -> &str {
        "volatile"
    }

    #[instrument(skip(self, subscriber), fields(base = %subscriber.base_currency, target = %subscriber.target_currency))]
    async fn create(&self, subscriber: NewSubscriber) -> Result<SubscriberId> {
        subscriber.validate()?;

        let id = SubscriberId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.insert(id, subscriber.into_subscriber(id));

        info!(subscriber_id = %id, "Subscriber registered");
        Ok(id)
    }

    async fn get(&self, id: SubscriberId) -> Result<Subscriber> {
        self.subscribers
            .get(&id)
            .map(|s| s.clone())
            .ok_or(RatewatchError::SubscriberNotFound(id))
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        let mut subscribers: Vec<Subscriber> =
            self.subscribers.iter().map(|s| s.value().clone()).collect();
        subscribers.sort_by_key(|s| s.id);
        Ok(subscribers)
    }

    async fn delete(&self, id: SubscriberId) -> Result<()> {
        self.subscribers
            .remove(&id)
            .ok_or(RatewatchError::SubscriberNotFound(id))?;

        info!(subscriber_id = %id, "Subscriber deleted");
        Ok(())
    }
}

type SubscriberRow = (i64, String, String, String, f64, f64);

fn from_row(row: SubscriberRow) -> Subscriber {
    let (id, webhook_url, base, target, min, max) = row;
    Subscriber {
        id: SubscriberId::new(id as u64),
        webhook_url,
        base_currency: Currency::new(base),
        target_currency: Currency::new(target),
        min_trigger_value: min,
        max_trigger_value: max,
    }
}

fn store_error(context: &str, err: sqlx::Error) -> RatewatchError {
    RatewatchError::Store(format!("{context}: {err}"))
}

/// Postgres-backed registry.
///
/// Ids come from a `BIGSERIAL` sequence, which never hands out a value
/// twice, so deleted ids stay unused.
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    /// Connect to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
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

    /// Create the subscribers table if it is missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscribers (
                id BIGSERIAL PRIMARY KEY,
                webhook_url TEXT NOT NULL,
                base_currency TEXT NOT NULL,
                target_currency TEXT NOT NULL,
                min_trigger_value DOUBLE PRECISION NOT NULL,
                max_trigger_value DOUBLE PRECISION NOT NULL,
                CHECK (min_trigger_value <= max_trigger_value)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("create subscribers", e))?;

        info!("Subscriber schema ready");
        Ok(())
    }

    fn db_id(id: SubscriberId) -> Result<i64> {
        i64::try_from(id.value()).map_err(|_| RatewatchError::SubscriberNotFound(id))
    }
}

#[async_trait]
impl SubscriberRegistry for PgRegistry {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn create(&self, subscriber: NewSubscriber) -> Result<SubscriberId> {
        subscriber.validate()?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO subscribers
                (webhook_url, base_currency, target_currency, min_trigger_value, max_trigger_value)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&subscriber.webhook_url)
        .bind(subscriber.base_currency.code())
        .bind(subscriber.target_currency.code())
        .bind(subscriber.min_trigger_value)
        .bind(subscriber.max_trigger_value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("insert subscriber", e))?;

        let id = SubscriberId::new(id as u64);
        info!(subscriber_id = %id, "Subscriber registered");
        Ok(id)
    }

    async fn get(&self, id: SubscriberId) -> Result<Subscriber> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            "SELECT id, webhook_url, base_currency, target_currency, min_trigger_value, max_trigger_value
             FROM subscribers WHERE id = $1",
        )
        .bind(Self::db_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("read subscriber", e))?;

        row.map(from_row).ok_or(RatewatchError::SubscriberNotFound(id))
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        let rows: Vec<SubscriberRow> = sqlx::query_as(
            "SELECT id, webhook_url, base_currency, target_currency, min_trigger_value, max_trigger_value
             FROM subscribers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("list subscribers", e))?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn delete(&self, id: SubscriberId) -> Result<()> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(Self::db_id(id)?)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("delete subscriber", e))?;

        if result.rows_affected() == 0 {
            return Err(RatewatchError::SubscriberNotFound(id));
        }

        info!(subscriber_id = %id, "Subscriber deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_subscriber(min: f64, max: f64) -> NewSubscriber {
        NewSubscriber::new("http://remoteUrl:8080/randomWebhookPath", "EUR", "NOK", min, max)
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let registry = VolatileRegistry::new();

        let first = registry.create(new_subscriber(1.5, 2.55)).await.unwrap();
        let second = registry.create(new_subscriber(1.5, 2.55)).await.unwrap();

        assert_eq!(first, SubscriberId::FIRST);
        assert_eq!(second, SubscriberId::new(2));
    }

    #[tokio::test]
    async fn test_get_returns_stored_record() {
        let registry = VolatileRegistry::new();
        let id = registry.create(new_subscriber(1.5, 2.55)).await.unwrap();

        let sub = registry.get(id).await.unwrap();

        assert_eq!(sub.id, id);
        assert_eq!(sub.webhook_url, "http://remoteUrl:8080/randomWebhookPath");
        assert_eq!(sub.target_currency, Currency::new("NOK"));
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let registry = VolatileRegistry::new();
        let err = registry.get(SubscriberId::new(2)).await.unwrap_err();
        assert_eq!(err, RatewatchError::SubscriberNotFound(SubscriberId::new(2)));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found_and_id_not_reused() {
        let registry = VolatileRegistry::new();
        let id = registry.create(new_subscriber(1.0, 2.0)).await.unwrap();

        registry.delete(id).await.unwrap();

        assert!(registry.get(id).await.unwrap_err().is_not_found());
        assert!(registry.delete(id).await.unwrap_err().is_not_found());

        let next = registry.create(new_subscriber(1.0, 2.0)).await.unwrap();
        assert_ne!(next, id);
        assert!(registry.get(id).await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid() {
        let registry = VolatileRegistry::new();

        let err = registry.create(new_subscriber(3.0, 2.0)).await.unwrap_err();

        assert!(matches!(err, RatewatchError::Validation { .. }));
        assert!(registry.is_empty());
        // a rejected record does not consume an id
        let id = registry.create(new_subscriber(1.0, 2.0)).await.unwrap();
        assert_eq!(id, SubscriberId::FIRST);
    }

    #[tokio::test]
    async fn test_register_from_json() {
        let registry = VolatileRegistry::new();
        let body = r#"{
            "webhookURL": "http://remoteUrl:8080/randomWebhookPath",
            "baseCurrency": "EUR",
            "targetCurrency": "NOK",
            "minTriggerValue": 1.50,
            "maxTriggerValue": 2.55
        }"#;

        let id = registry.register(body).await.unwrap();
        assert_eq!(registry.get(id).await.unwrap().max_trigger_value, 2.55);

        let missing = r#"{"webhookURL": "http://remoteUrl:8080/x", "baseCurrency": "EUR"}"#;
        assert!(matches!(
            registry.register(missing).await,
            Err(RatewatchError::Validation { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let registry = VolatileRegistry::new();
        for _ in 0..5 {
            registry.create(new_subscriber(1.0, 2.0)).await.unwrap();
        }
        registry.delete(SubscriberId::new(3)).await.unwrap();

        let ids: Vec<u64> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.value())
            .collect();

        assert_eq!(ids, vec![1, 2, 4, 5]);
    }
}
