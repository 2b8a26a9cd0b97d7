//! Trigger band evaluation.

use ratewatch_common::{RateSnapshot, RatewatchError, Subscriber, SubscriberId};
use tracing::{debug, warn};

/// A subscriber whose band contains the current pair rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub subscriber: Subscriber,
    /// The pair rate that satisfied the band.
    pub current_rate: f64,
}

/// A subscriber left out of an evaluation because its pair could not be
/// priced.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSubscriber {
    pub subscriber_id: SubscriberId,
    pub reason: RatewatchError,
}

/// Full result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub triggered: Vec<Trigger>,
    pub skipped: Vec<SkippedSubscriber>,
    /// Subscribers priced successfully but outside their band.
    pub out_of_band: usize,
}

/// Decides which subscribers fire for a snapshot.
///
/// Evaluation is level-triggered and keeps no state: every pass reports
/// every in-band subscriber, whether or not it fired last time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Subscribers whose pair rate lies within `[min, max]`, with that rate.
    pub fn evaluate(&self, snapshot: &RateSnapshot, subscribers: &[Subscriber]) -> Vec<Trigger> {
        self.evaluate_detailed(snapshot, subscribers).triggered
    }

    /// Like [`TriggerEvaluator::evaluate`], also reporting which subscribers
    /// were skipped and why.
    pub fn evaluate_detailed(&self, snapshot: &RateSnapshot, subscribers: &[Subscriber]) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for subscriber in subscribers {
            let rate = match snapshot.rate(&subscriber.base_currency, &subscriber.target_currency) {
                Ok(rate) => rate,
                Err(reason) => {
                    warn!(
                        subscriber_id = %subscriber.id,
                        pair = %subscriber.pair(),
                        snapshot = %snapshot.name,
                        error = %reason,
                        "Skipping subscriber with unresolvable pair"
                    );
                    evaluation.skipped.push(SkippedSubscriber {
                        subscriber_id: subscriber.id,
                        reason,
                    });
                    continue;
                }
            };

            if subscriber.in_band(rate) {
                debug!(subscriber_id = %subscriber.id, rate, "Trigger band satisfied");
                evaluation.triggered.push(Trigger {
                    subscriber: subscriber.clone(),
                    current_rate: rate,
                });
            } else {
                evaluation.out_of_band += 1;
            }
        }

        evaluation
    }
}
