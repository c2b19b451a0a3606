// Tick events - Immutable per-instant payload handed to sinks and listeners

use super::accents::AccentLevel;
use super::timeline::{Subdivision, Tempo, TimeSignature};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickKind {
    Beat,
}

/// One scheduled beat or subdivision instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickEvent {
    pub kind: TickKind,
    /// Scheduled time on the clock source, in seconds
    pub timestamp: f64,
    /// 1-based beat number; subdivisions carry a fractional tag (1.5, 2.25)
    pub beat_number: f64,
    /// 0 for the main beat, 1.. for the subdivision slot inside the beat
    pub subdivision_index: u8,
    /// 1-based measure number
    pub measure_number: u32,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub subdivision: Subdivision,
    pub accent: AccentLevel,
    pub beat_duration_ms: f64,
    /// Timestamp of the next main-beat tick
    pub next_beat_time: f64,
}

impl TickEvent {
    pub fn is_main_beat(&self) -> bool {
        self.subdivision_index == 0
    }

    /// 0-based index of the beat this tick belongs to
    pub fn beat_index(&self) -> usize {
        (self.beat_number.floor() as usize).saturating_sub(1)
    }
}
