//! Error helpers for the FX pipeline.
//!
//! Transport errors are folded into the shared taxonomy here so callers only
//! ever see [`RatewatchError`].

use std::fmt::Display;

use ratewatch_common::RatewatchError;

/// Result type for FX operations.
pub type FxResult<T> = Result<T, RatewatchError>;

/// Wrap a provider-side failure.
pub(crate) fn fetch_error(context: impl Display, err: impl Display) -> RatewatchError {
    RatewatchError::Fetch(format!("{context}: {err}"))
}

/// Wrap a storage-side failure.
pub(crate) fn store_error(context: impl Display, err: impl Display) -> RatewatchError {
    RatewatchError::Store(format!("{context}: {err}"))
}
