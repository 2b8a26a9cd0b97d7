//! Webhook delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use ratewatch_common::{constants, Currency, RatewatchError, Result, Subscriber, SubscriberId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::trigger::Trigger;

/// JSON body POSTed to a subscriber's webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub notification_id: Uuid,
    pub subscriber_id: SubscriberId,
    pub base_currency: Currency,
    pub target_currency: Currency,
    pub current_rate: f64,
    pub min_trigger_value: f64,
    pub max_trigger_value: f64,
    pub sent_at: DateTime<Utc>,
}

impl WebhookPayload {
    /// Build the notification for a subscriber.
    pub fn new(subscriber: &Subscriber, current_rate: f64) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            subscriber_id: subscriber.id,
            base_currency: subscriber.base_currency.clone(),
            target_currency: subscriber.target_currency.clone(),
            current_rate,
            min_trigger_value: subscriber.min_trigger_value,
            max_trigger_value: subscriber.max_trigger_value,
            sent_at: Utc::now(),
        }
    }
}

/// A delivery that did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub subscriber_id: SubscriberId,
    pub error: RatewatchError,
}

/// Outcome of dispatching one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Subscribers whose webhook answered 2xx, by id.
    pub delivered: Vec<SubscriberId>,
    /// Failed deliveries, by subscriber id.
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchReport {
    /// Number of delivery attempts in the batch.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failures.len()
    }

    /// Check if every delivery succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Configuration for webhook delivery.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum deliveries in flight at once.
    pub concurrency: usize,
    /// User agent sent with each notification.
    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: constants::default_webhook_timeout(),
            concurrency: 16,
            user_agent: format!("ratewatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Delivers notifications to subscriber webhooks.
///
/// Each notification is attempted once. Failures are reported, never
/// retried.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    /// Create a dispatcher.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RatewatchError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Deliver one notification.
    #[instrument(skip(self, subscriber), fields(subscriber_id = %subscriber.id))]
    pub async fn dispatch(&self, subscriber: &Subscriber, current_rate: f64) -> Result<()> {
        let payload = WebhookPayload::new(subscriber, current_rate);
        let url = &subscriber.webhook_url;

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RatewatchError::Delivery {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RatewatchError::Delivery {
                url: url.clone(),
                reason: format!("webhook answered {status}"),
            });
        }

        info!(
            notification_id = %payload.notification_id,
            rate = current_rate,
            "Webhook delivered"
        );
        Ok(())
    }

    /// Deliver a batch of notifications concurrently.
    ///
    /// Returns once every attempt has resolved. One failure never stops the
    /// remaining deliveries.
    pub async fn dispatch_batch(&self, triggers: &[Trigger]) -> DispatchReport {
        let deliveries: Vec<_> = triggers
            .iter()
            .cloned()
            .map(|trigger| async move {
                let outcome = self.dispatch(&trigger.subscriber, trigger.current_rate).await;
                (trigger.subscriber.id, outcome)
            })
            .collect();

        let results: Vec<(SubscriberId, Result<()>)> = stream::iter(deliveries)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = DispatchReport::default();
        for (subscriber_id, outcome) in results {
            match outcome {
                Ok(()) => report.delivered.push(subscriber_id),
                Err(error) => {
                    warn!(subscriber_id = %subscriber_id, error = %error, "Webhook delivery failed");
                    report.failures.push(DeliveryFailure {
                        subscriber_id,
                        error,
                    });
                }
            }
        }

        report.delivered.sort();
        report.failures.sort_by_key(|f| f.subscriber_id);
        report
    }
}
