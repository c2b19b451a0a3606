// Stream clock - Time derived from the number of rendered audio frames
//
// The audio-hardware analogue: the renderer advances the sample counter
// after every buffer, and "now" is that counter divided by the sample rate.

use super::clock::{ClockSource, ClockState, SharedClock};
use crate::audio::parameters::AtomicF64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared sample-position clock
#[derive(Debug, Clone)]
pub struct StreamClock {
    /// Current sample position (incremented by the audio callback)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
    suspended: Arc<AtomicBool>,
}

impl StreamClock {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current sample position
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance by `frames` rendered frames (called from the audio callback).
    /// A suspended stream does not advance.
    pub fn advance(&self, frames: usize) {
        if self.suspended.load(Ordering::Relaxed) {
            return;
        }
        self.sample_position
            .fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// Convert a clock time in seconds to an absolute sample index
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl ClockSource for StreamClock {
    fn now(&self) -> f64 {
        self.current_sample() as f64 / self.sample_rate
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

/// Maps times of a scheduler clock onto a stream's frame counter.
///
/// The frame counter only moves once per rendered block, so comparing it
/// with a continuous clock would place a click late by however much of the
/// current block had already played. Instead the audio callback captures
/// the pair (clock time, frame) at the start of every block and ticks are
/// converted against that capture.
#[derive(Clone)]
pub struct FrameAnchor {
    clock: SharedClock,
    frames: StreamClock,
    /// Scheduler clock time of frame 0
    origin: AtomicF64,
}

impl FrameAnchor {
    pub fn new(clock: SharedClock, frames: StreamClock) -> Self {
        let anchor = Self {
            clock,
            frames,
            origin: AtomicF64::new(0.0),
        };
        anchor.capture();
        anchor
    }

    /// Re-anchor at the current block start (called from the audio callback)
    pub fn capture(&self) {
        self.origin.set(self.clock.now() - self.frames.now());
    }

    /// Absolute frame at which scheduler time `seconds` will be rendered
    pub fn frame_at(&self, seconds: f64) -> u64 {
        self.frames.seconds_to_samples(seconds - self.origin.get())
    }

    pub fn frames(&self) -> &StreamClock {
        &self.frames
    }
}
