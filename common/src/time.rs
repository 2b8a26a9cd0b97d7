//! Calendar utilities and constants for ratewatch.

use chrono::{Days, NaiveDate, Utc};

/// Timing and window constants.
pub mod constants {
    use std::time::Duration;

    /// Length of the trailing average window in days.
    pub const DEFAULT_AVERAGE_DAYS: u32 = 7;

    /// Date format used by the provider's historical endpoint.
    pub const PROVIDER_DATE_FORMAT: &str = "%Y-%m-%d";

    /// Refresh cadence (once a day).
    pub fn default_refresh_interval() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    /// Provider request timeout.
    pub fn default_http_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Webhook delivery timeout.
    pub fn default_webhook_timeout() -> Duration {
        Duration::from_secs(5)
    }
}

/// Today's calendar date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Format a date the way the provider expects it in a path.
pub fn format_date(date: NaiveDate) -> String {
    date.format(constants::PROVIDER_DATE_FORMAT).to_string()
}

/// Dates in a trailing window ending on `end`, newest first.
///
/// The window includes `end` itself, so a 7-day window is `end` and the six
/// days before it.
pub fn trailing_window(end: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .map_while(|offset| end.checked_sub_days(Days::new(offset)))
        .collect()
}
