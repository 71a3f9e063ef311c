//! Timestamp type used throughout the chain.
//!
//! Timestamps are Unix epoch seconds (UTC). Block production requires clock
//! synchronization between nodes (NTP or equivalent).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs();
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn saturating_add_secs(&self, secs: u64) -> Timestamp {
        Self(self.0.saturating_add(secs))
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Timestamp {
        Self(self.0.saturating_sub(secs))
    }

    /// Round down to a multiple of `interval_secs`.
    pub fn align_down(&self, interval_secs: u64) -> Timestamp {
        if interval_secs == 0 {
            return *self;
        }
        Self(self.0 - self.0 % interval_secs)
    }

    /// Seconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn secs_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
