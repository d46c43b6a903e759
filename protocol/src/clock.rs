//! Injected time source.
//!
//! Everything in the core that needs "now" (token issued-at, order creation
//! timestamps, cache age) asks a [`Clock`] instead of reading the system
//! time directly, so tests can pin time and agent devices can be driven
//! deterministically.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as whole seconds since the Unix epoch.
    fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start the clock at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start the clock at a Unix timestamp (seconds). Out-of-range values
    /// clamp to the epoch.
    pub fn at_unix(seconds: i64) -> Self {
        let start = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .unwrap_or_default();
        Self::new(start)
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_on_demand() {
        let clock = ManualClock::at_unix(1_700_000_000);
        assert_eq!(clock.unix_seconds(), 1_700_000_000);
        assert_eq!(clock.unix_seconds(), 1_700_000_000);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.unix_seconds(), 1_700_000_090);
    }

    #[test]
    fn manual_clock_set_overrides() {
        let clock = ManualClock::at_unix(0);
        let target = Utc.timestamp_opt(42, 0).single().unwrap();
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.unix_seconds() > 1_577_836_800);
    }
}
