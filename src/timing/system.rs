// System clock - Monotonic wall clock based on std::time::Instant

use super::clock::{ClockSource, ClockState};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SuspendState {
    suspended_at: Option<Instant>,
    /// Total time spent suspended, excluded from `now()`
    paused_total: Duration,
}

/// Wall clock that stops while suspended, like an audio context does
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    state: Mutex<SuspendState>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(SuspendState {
                suspended_at: None,
                paused_total: Duration::ZERO,
            }),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let reference = state.suspended_at.unwrap_or_else(Instant::now);
        reference
            .saturating_duration_since(self.origin)
            .saturating_sub(state.paused_total)
            .as_secs_f64()
    }

    fn state(&self) -> ClockState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.suspended_at.is_some() {
            ClockState::Suspended
        } else {
            ClockState::Running
        }
    }

    fn suspend(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.suspended_at.is_none() {
            state.suspended_at = Some(Instant::now());
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(since) = state.suspended_at.take() {
            state.paused_total += since.elapsed();
        }
    }
}
