//! Error types for ratewatch.

use crate::{Currency, SnapshotName, SubscriberId};
use thiserror::Error;

/// Main error type for ratewatch operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RatewatchError {
    /// Provider unreachable, non-success response or malformed payload.
    #[error("Rate fetch failed: {0}")]
    Fetch(String),

    /// Persistence read, write or wipe failure.
    #[error("Storage error: {0}")]
    Store(String),

    /// Malformed subscriber record or request input.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Currency code not present in the snapshot.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(Currency),

    /// Snapshot has not been written since the last wipe.
    #[error("Snapshot not yet refreshed: {0}")]
    SnapshotNotFound(SnapshotName),

    /// Unknown subscriber id.
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(SubscriberId),

    /// A rate table carried a zero entry for the source currency.
    #[error("Rate for {currency} is zero")]
    DivisionByZero { currency: Currency },

    /// Webhook unreachable or answered with a non-success status.
    #[error("Webhook delivery to {url} failed: {reason}")]
    Delivery { url: String, reason: String },

    /// Another refresh cycle holds the single-flight guard.
    #[error("A refresh cycle is already in progress")]
    RefreshInProgress,

    /// The watcher is stopping or stopped and starts no new cycles.
    #[error("Watcher is not running: {0}")]
    NotRunning(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RatewatchError {
    /// Create a validation error without a field.
    pub fn validation(message: impl Into<String>) -> Self {
        RatewatchError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error for a named field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        RatewatchError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if re-running the failed operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RatewatchError::Fetch(_)
                | RatewatchError::Store(_)
                | RatewatchError::Delivery { .. }
                | RatewatchError::RefreshInProgress
        )
    }

    /// Check if this error means "nothing there" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RatewatchError::SnapshotNotFound(_) | RatewatchError::SubscriberNotFound(_)
        )
    }

    /// Get a stable error code for API responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            RatewatchError::Fetch(_) => "FETCH_ERROR",
            RatewatchError::Store(_) => "STORE_ERROR",
            RatewatchError::Validation { .. } => "VALIDATION_ERROR",
            RatewatchError::InvalidCurrency(_) => "INVALID_CURRENCY",
            RatewatchError::SnapshotNotFound(_) => "SNAPSHOT_NOT_FOUND",
            RatewatchError::SubscriberNotFound(_) => "SUBSCRIBER_NOT_FOUND",
            RatewatchError::DivisionByZero { .. } => "DIVISION_BY_ZERO",
            RatewatchError::Delivery { .. } => "DELIVERY_ERROR",
            RatewatchError::RefreshInProgress => "REFRESH_IN_PROGRESS",
            RatewatchError::NotRunning(_) => "NOT_RUNNING",
            RatewatchError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for ratewatch operations.
pub type Result<T> = std::result::Result<T, RatewatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RatewatchError::Fetch("timeout".into()).error_code(),
            "FETCH_ERROR"
        );
        assert_eq!(
            RatewatchError::SnapshotNotFound(SnapshotName::Average).error_code(),
            "SNAPSHOT_NOT_FOUND"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(RatewatchError::Store("down".into()).is_retryable());
        assert!(!RatewatchError::validation("bad").is_retryable());
        assert!(!RatewatchError::InvalidCurrency(Currency::new("XYZ")).is_retryable());
    }

    #[test]
    fn test_not_found() {
        assert!(RatewatchError::SubscriberNotFound(SubscriberId::new(3)).is_not_found());
        assert!(!RatewatchError::RefreshInProgress.is_not_found());
    }

    #[test]
    fn test_invalid_field_message() {
        let err = RatewatchError::invalid_field("webhookURL", "must not be empty");
        assert_eq!(err.to_string(), "Validation failed: must not be empty");
        assert!(matches!(
            err,
            RatewatchError::Validation { field: Some(ref f), .. } if f == "webhookURL"
        ));
    }
}
