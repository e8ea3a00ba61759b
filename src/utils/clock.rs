//! Wall clock abstraction
//!
//! Rate-limit windows and cache TTLs are evaluated against an injected clock so
//! that tests can simulate elapsed time without sleeping.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for simulated time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Time elapsed from `since` to `now`, saturating at zero when the clock went backwards.
pub fn elapsed_between(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::starting_now();
        let start = clock.now();
        clock.advance(Duration::from_secs(61));
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(61));
    }

    #[test]
    fn test_elapsed_saturates_when_clock_goes_backwards() {
        let clock = ManualClock::starting_now();
        let later = clock.now() + TimeDelta::seconds(10);
        assert_eq!(elapsed_between(later, clock.now()), Duration::ZERO);
    }
}
