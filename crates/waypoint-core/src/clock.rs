//! Time source for event and resource timestamps.

use chrono::{DateTime, SubsecRound, Utc};
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// Source of wall-clock time. Implementations return microsecond precision
/// so timestamps survive a round-trip through storage unchanged.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// A clock that advances by a fixed step on every read.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    step: chrono::Duration,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(6)),
            step,
        }
    }

    /// A clock frozen at `at`.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::new(at, chrono::Duration::zero())
    }

    /// Move the clock to `at`, possibly backwards.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at.trunc_subsecs(6);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *now;
        *now = current + self.step;
        current
    }
}
