// Timeline - Musical time primitives
// Tempo, time signature and beat subdivision used by the scheduler

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per measure (typically 2..12)
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature. Zero values are raised to 1.
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: numerator.max(1),
            denominator: denominator.max(1),
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Number of beats per measure
    pub fn beats_per_measure(&self) -> usize {
        self.numerator.max(1) as usize
    }

    /// Returns the same signature with zero fields raised to 1
    pub fn normalized(self) -> Self {
        Self::new(self.numerator, self.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = String;

    /// Parses "7/8" style signatures
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (beats, note) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid time signature '{}', expected B/N", s))?;
        let beats: u8 = beats
            .trim()
            .parse()
            .map_err(|e| format!("Invalid beat count '{}': {}", beats, e))?;
        let note: u8 = note
            .trim()
            .parse()
            .map_err(|e| format!("Invalid note value '{}': {}", note, e))?;
        if beats == 0 || note == 0 {
            return Err(format!("Time signature '{}' must be positive", s));
        }
        Ok(Self::new(beats, note))
    }
}

/// Tempo in BPM (Beats Per Minute), always inside [MIN_BPM, MAX_BPM]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 30.0;
    pub const MAX_BPM: f64 = 500.0;
    pub const DEFAULT_BPM: f64 = 120.0;

    /// Creates a new tempo, clamped into [30, 500] BPM.
    /// NaN falls back to the default tempo.
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_nan() {
            Self::DEFAULT_BPM
        } else {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        };
        Self { bpm }
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in milliseconds (`60000 / bpm`)
    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }

    /// Duration of one measure in seconds at given time signature
    pub fn measure_duration_seconds(&self, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_seconds() * time_signature.beats_per_measure() as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BPM)
    }
}

impl From<f64> for Tempo {
    fn from(bpm: f64) -> Self {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Beat subdivision clicked between main beats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subdivision {
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    Triplet,
}

impl Subdivision {
    /// Offsets of the extra ticks inside one beat, as fractions of the beat
    pub fn offsets(&self) -> &'static [f64] {
        match self {
            Subdivision::Quarter => &[],
            Subdivision::Eighth => &[0.5],
            Subdivision::Sixteenth => &[0.25, 0.5, 0.75],
            Subdivision::Triplet => &[1.0 / 3.0, 2.0 / 3.0],
        }
    }

    /// Ticks per main beat, main beat included
    pub fn ticks_per_beat(&self) -> usize {
        self.offsets().len() + 1
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subdivision::Quarter => "quarter",
            Subdivision::Eighth => "eighth",
            Subdivision::Sixteenth => "sixteenth",
            Subdivision::Triplet => "triplet",
        };
        f.write_str(name)
    }
}

impl FromStr for Subdivision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quarter" | "1" => Ok(Subdivision::Quarter),
            "eighth" | "2" => Ok(Subdivision::Eighth),
            "sixteenth" | "4" => Ok(Subdivision::Sixteenth),
            "triplet" | "3" => Ok(Subdivision::Triplet),
            other => Err(format!("Unknown subdivision: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.numerator, 4);
        assert_eq!(ts.denominator, 4);
        assert_eq!(ts.beats_per_measure(), 4);
        assert_eq!(ts.to_string(), "4/4");
    }

    #[test]
    fn test_time_signature_parsing() {
        assert_eq!("7/8".parse::<TimeSignature>(), Ok(TimeSignature::new(7, 8)));
        assert_eq!(" 3 / 4 ".parse::<TimeSignature>(), Ok(TimeSignature::three_four()));
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("four".parse::<TimeSignature>().is_err());
    }

    #[test]
    fn test_time_signature_zero_is_raised() {
        let ts = TimeSignature::new(0, 0);
        assert_eq!(ts, TimeSignature::new(1, 1));
    }

    #[test]
    fn test_tempo_clamp() {
        assert_eq!(Tempo::new(20.0).bpm(), 30.0);
        assert_eq!(Tempo::new(600.0).bpm(), 500.0);
        assert_eq!(Tempo::new(f64::INFINITY).bpm(), 500.0);
        assert_eq!(Tempo::new(f64::NAN).bpm(), 120.0);
        assert_eq!(Tempo::new(93.5).bpm(), 93.5);
    }

    #[test]
    fn test_beat_duration() {
        assert_eq!(Tempo::new(60.0).beat_duration_ms(), 1000.0);
        assert_eq!(Tempo::new(120.0).beat_duration_ms(), 500.0);
        assert_eq!(Tempo::new(300.0).beat_duration_ms(), 200.0);

        // At 120 BPM, one beat = 0.5s = 24000 samples at 48 kHz
        assert_eq!(Tempo::new(120.0).beat_duration_samples(48000.0), 24000.0);
        assert_eq!(
            Tempo::new(120.0).measure_duration_seconds(&TimeSignature::three_four()),
            1.5
        );
    }

    #[test]
    fn test_tempo_deserialization_clamps() {
        let tempo: Tempo = serde_json::from_str("1000.0").unwrap();
        assert_eq!(tempo.bpm(), 500.0);
        assert_eq!(serde_json::to_string(&Tempo::new(90.0)).unwrap(), "90.0");
    }

    #[test]
    fn test_subdivision_offsets() {
        assert_eq!(Subdivision::Quarter.ticks_per_beat(), 1);
        assert_eq!(Subdivision::Eighth.ticks_per_beat(), 2);
        assert_eq!(Subdivision::Sixteenth.ticks_per_beat(), 4);
        assert_eq!(Subdivision::Triplet.ticks_per_beat(), 3);
        assert_eq!(Subdivision::Sixteenth.offsets(), &[0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_subdivision_parsing() {
        assert_eq!("Eighth".parse::<Subdivision>(), Ok(Subdivision::Eighth));
        assert_eq!("triplet".parse::<Subdivision>(), Ok(Subdivision::Triplet));
        assert!("quintuplet".parse::<Subdivision>().is_err());
        assert_eq!(Subdivision::Sixteenth.to_string(), "sixteenth");
    }
}
