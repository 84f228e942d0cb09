//! Time sources for audit timestamps.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Supplies audit timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock that never hands out the same timestamp twice.
///
/// When the system clock stalls or steps backwards, the last value plus one
/// microsecond is returned instead.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Timestamp::now().as_micros();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Timestamp::from_micros(next),
                Err(observed) => last = observed,
            }
        }
    }
}

/// Clock driven by hand, for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicU64::new(start.as_micros()),
        }
    }

    /// Sets the reading.
    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.as_micros(), Ordering::Release);
    }

    /// Moves the reading forward.
    pub fn advance(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::Acquire))
    }
}
