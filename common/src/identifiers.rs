//! Identifier types for ratewatch entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RatewatchError;

/// Registry-assigned subscriber identifier.
/// Assigned monotonically starting at 1 and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// The first id a fresh registry hands out.
    pub const FIRST: SubscriberId = SubscriberId(1);

    /// Create a subscriber id from its numeric value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Parse from a path segment or query value.
    pub fn parse(s: &str) -> Result<Self, RatewatchError> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| RatewatchError::invalid_field("id", format!("not a subscriber id: {s:?}")))
    }

    /// Get the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubscriberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for SubscriberId {
    type Err = RatewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Name of a stored rate snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotName {
    /// Most recent rate table from the provider.
    Latest,
    /// Trailing average over the configured window.
    Average,
}

impl SnapshotName {
    /// All snapshot names written by a refresh cycle.
    pub const ALL: [SnapshotName; 2] = [SnapshotName::Latest, SnapshotName::Average];

    /// Get the storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotName::Latest => "latest",
            SnapshotName::Average => "average",
        }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotName {
    type Err = RatewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(SnapshotName::Latest),
            "average" => Ok(SnapshotName::Average),
            other => Err(RatewatchError::invalid_field(
                "name",
                format!("unknown snapshot name: {other}"),
            )),
        }
    }
}
