//! Millisecond timestamps carried in protocol messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch (UTC).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);

    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Current wall-clock time. A clock set before 1970 reads as the epoch.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed between `self` and a later `now`, zero if `now` is earlier.
    pub fn elapsed_since(&self, now: Timestamp) -> Duration {
        Duration::from_millis(now.0.saturating_sub(self.0))
    }

    /// Delay from `self` until the next multiple of `period` since the epoch.
    /// A timestamp sitting exactly on a boundary waits a full period.
    pub fn until_next_boundary(&self, period: Duration) -> Duration {
        let period_ms = period.as_millis() as u64;
        if period_ms == 0 {
            return Duration::ZERO;
        }
        let into = self.0 % period_ms;
        Duration::from_millis(period_ms - into)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
