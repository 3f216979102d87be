//! Throttle policy
//!
//! A passive, timer-free rate limit: an emission is allowed when at least the
//! configured interval has elapsed since the last allowed emission.

use crate::types::Timestamp;
use chrono::Duration;

/// Decide whether an emission is allowed at `now`
///
/// `last` is `None` when nothing has been emitted yet, which always allows.
/// A clock that went backwards yields a negative elapsed time and blocks.
pub fn allow(last: Option<Timestamp>, now: Timestamp, min_interval_ms: u64) -> bool {
    match last {
        None => true,
        Some(last) => {
            let min_interval = Duration::milliseconds(min_interval_ms.min(i64::MAX as u64) as i64);
            now.signed_duration_since(last) >= min_interval
        }
    }
}

/// Owner of one last-emission timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttle {
    interval_ms: u64,
    last: Option<Timestamp>,
}

impl Throttle {
    /// Create a throttle that has never emitted
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    /// Check the policy and record `now` if the emission is allowed
    pub fn try_acquire(&mut self, now: Timestamp) -> bool {
        if allow(self.last, now, self.interval_ms) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    /// Timestamp of the last allowed emission
    pub fn last(&self) -> Option<Timestamp> {
        self.last
    }

    /// Configured minimum interval in milliseconds
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
