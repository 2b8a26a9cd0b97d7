//! Ratewatch Common Types
//!
//! This crate contains shared types used across ratewatch, including
//! currency codes, rate tables, named snapshots, webhook subscribers and
//! the error taxonomy.

pub mod identifiers;
pub mod rates;
pub mod subscriber;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use rates::*;
pub use subscriber::*;
pub use error::*;
pub use time::*;
