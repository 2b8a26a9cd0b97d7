//! Ratewatch Notifier
//!
//! Webhook subscriptions for ratewatch: the subscriber registry, trigger
//! band evaluation against a rate snapshot, and webhook delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! use ratewatch_notifier::{SubscriberRegistry, TriggerEvaluator, VolatileRegistry, WebhookDispatcher};
//!
//! let registry = VolatileRegistry::new();
//! registry.register(body).await?;
//!
//! let triggers = TriggerEvaluator::new().evaluate(&snapshot, &registry.list().await?);
//! let report = WebhookDispatcher::new(Default::default())?.dispatch_batch(&triggers).await;
//! ```

pub mod dispatcher;
pub mod registry;
pub mod trigger;

pub use dispatcher::{DeliveryFailure, DispatchReport, DispatcherConfig, WebhookDispatcher, WebhookPayload};
pub use registry::{PgRegistry, SubscriberRegistry, VolatileRegistry};
pub use trigger::{Evaluation, SkippedSubscriber, Trigger, TriggerEvaluator};
