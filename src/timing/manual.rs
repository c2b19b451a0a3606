// Manual clock - Externally driven time for tests and offline rendering

use super::clock::{ClockSource, ClockState};
use crate::audio::parameters::AtomicF64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clock whose time only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the
/// scheduler owns another. Time never moves backwards: `set` with an
/// earlier value is ignored.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: AtomicF64,
    suspended: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.seconds.fetch_max(seconds);
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.seconds.fetch_max(self.seconds.get() + seconds);
        }
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        self.seconds.get()
    }

    fn state(&self) -> ClockState {
        if self.suspended.load(Ordering::Acquire) {
            ClockState::Suspended
        } else {
            ClockState::Running
        }
    }

    fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }
}
