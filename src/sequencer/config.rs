// Metronome configuration - Tempo, meter, subdivision, accents and level

use super::accents::{self, AccentLevel};
use super::timeline::{Subdivision, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};

/// Full metronome configuration.
///
/// Owned by the scheduler; sinks only ever receive clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub subdivision: Subdivision,
    /// One entry per beat of the measure
    pub accents: Vec<AccentLevel>,
    /// Output level (0.0 to 1.0)
    pub volume: f32,
    pub muted: bool,
}

impl MetronomeConfig {
    pub const DEFAULT_VOLUME: f32 = 0.8;

    pub fn new(bpm: f64, time_signature: TimeSignature) -> Self {
        Self {
            tempo: Tempo::new(bpm),
            time_signature: time_signature.normalized(),
            accents: accents::default_pattern(&time_signature.normalized()),
            ..Self::default()
        }
    }

    /// Returns a copy with every invariant restored: tempo clamped, zero
    /// meter fields raised, volume clamped and the accent pattern resized
    /// to the measure (an empty pattern becomes the meter default).
    pub fn normalized(mut self) -> Self {
        self.tempo = Tempo::new(self.tempo.bpm());
        self.time_signature = self.time_signature.normalized();
        self.volume = clamp_volume(self.volume);

        let beats = self.time_signature.beats_per_measure();
        self.accents = if self.accents.is_empty() {
            accents::default_pattern(&self.time_signature)
        } else {
            accents::resync_pattern(self.accents, beats)
        };
        self
    }

    pub fn beat_duration_ms(&self) -> f64 {
        self.tempo.beat_duration_ms()
    }

    pub fn beats_per_measure(&self) -> usize {
        self.time_signature.beats_per_measure()
    }

    /// Accent for a 0-based beat index; out of range reads as Normal
    pub fn accent_for(&self, beat_index: usize) -> AccentLevel {
        self.accents.get(beat_index).copied().unwrap_or_default()
    }
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        let time_signature = TimeSignature::default();
        Self {
            tempo: Tempo::default(),
            time_signature,
            subdivision: Subdivision::default(),
            accents: accents::default_pattern(&time_signature),
            volume: Self::DEFAULT_VOLUME,
            muted: false,
        }
    }
}

/// Clamp a volume into [0, 1]; NaN is treated as silence
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
