// Accents - Per-beat emphasis and meter-aware default patterns

use super::timeline::TimeSignature;
use serde::{Deserialize, Serialize};

/// Emphasis applied to one beat of the measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccentLevel {
    #[default]
    Normal,
    /// Strong accent (downbeat, group starts in compound meters)
    Accent,
    /// Weaker accent, e.g. beat 3 of 4/4
    Secondary,
    /// Beat is counted but not sounded
    Mute,
}

impl AccentLevel {
    /// Relative render gain for this level
    pub fn gain(&self) -> f32 {
        match self {
            AccentLevel::Accent => 1.0,
            AccentLevel::Secondary => 0.75,
            AccentLevel::Normal => 0.55,
            AccentLevel::Mute => 0.0,
        }
    }

    pub fn is_audible(&self) -> bool {
        !matches!(self, AccentLevel::Mute)
    }
}

/// Meter classification used to pick a default accent pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterClass {
    Simple,
    /// Eighth-note meters grouped in threes: 6/8, 9/8, 12/8
    Compound,
    /// 5 or 7 beats per measure
    Irregular,
}

impl MeterClass {
    pub fn classify(time_signature: &TimeSignature) -> Self {
        let beats = time_signature.numerator;
        if time_signature.denominator == 8 && beats >= 6 && beats % 3 == 0 {
            MeterClass::Compound
        } else if beats == 5 || beats == 7 {
            MeterClass::Irregular
        } else {
            MeterClass::Simple
        }
    }
}

/// Default accent pattern for a time signature.
///
/// Beat 0 is always accented. Compound meters also accent every group
/// start (indices 3, 6, 9, ...). Plain 4/4 gets a secondary accent on
/// index 2. Everything else is Normal.
pub fn default_pattern(time_signature: &TimeSignature) -> Vec<AccentLevel> {
    let beats = time_signature.beats_per_measure();
    let mut pattern = vec![AccentLevel::Normal; beats];
    pattern[0] = AccentLevel::Accent;

    match MeterClass::classify(time_signature) {
        MeterClass::Compound => {
            for index in (3..beats).step_by(3) {
                pattern[index] = AccentLevel::Accent;
            }
        }
        MeterClass::Simple if time_signature.numerator == 4 && time_signature.denominator == 4 => {
            pattern[2] = AccentLevel::Secondary;
        }
        MeterClass::Simple | MeterClass::Irregular => {}
    }

    pattern
}

/// Fit `levels` to `beats` entries: extra entries are dropped, missing
/// ones are Normal.
pub fn resync_pattern(mut levels: Vec<AccentLevel>, beats: usize) -> Vec<AccentLevel> {
    levels.resize(beats.max(1), AccentLevel::Normal);
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccentLevel::*;

    #[test]
    fn test_meter_classification() {
        assert_eq!(MeterClass::classify(&TimeSignature::four_four()), MeterClass::Simple);
        assert_eq!(MeterClass::classify(&TimeSignature::six_eight()), MeterClass::Compound);
        assert_eq!(MeterClass::classify(&TimeSignature::new(12, 8)), MeterClass::Compound);
        assert_eq!(MeterClass::classify(&TimeSignature::new(3, 8)), MeterClass::Simple);
        assert_eq!(MeterClass::classify(&TimeSignature::new(6, 4)), MeterClass::Simple);
        assert_eq!(MeterClass::classify(&TimeSignature::new(5, 4)), MeterClass::Irregular);
        assert_eq!(MeterClass::classify(&TimeSignature::new(7, 8)), MeterClass::Irregular);
    }

    #[test]
    fn test_four_four_pattern() {
        assert_eq!(
            default_pattern(&TimeSignature::four_four()),
            vec![Accent, Normal, Secondary, Normal]
        );
    }

    #[test]
    fn test_three_four_pattern() {
        assert_eq!(
            default_pattern(&TimeSignature::three_four()),
            vec![Accent, Normal, Normal]
        );
    }

    #[test]
    fn test_compound_patterns() {
        assert_eq!(
            default_pattern(&TimeSignature::six_eight()),
            vec![Accent, Normal, Normal, Accent, Normal, Normal]
        );

        let nine_eight = default_pattern(&TimeSignature::new(9, 8));
        assert_eq!(nine_eight.len(), 9);
        let accented: Vec<usize> = nine_eight
            .iter()
            .enumerate()
            .filter(|(_, level)| **level == Accent)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(accented, vec![0, 3, 6]);
    }

    #[test]
    fn test_irregular_and_single_beat_patterns() {
        assert_eq!(
            default_pattern(&TimeSignature::new(5, 4)),
            vec![Accent, Normal, Normal, Normal, Normal]
        );
        assert_eq!(default_pattern(&TimeSignature::new(1, 4)), vec![Accent]);
    }

    #[test]
    fn test_resync_pattern() {
        assert_eq!(resync_pattern(vec![Accent, Mute, Normal, Normal], 2), vec![Accent, Mute]);
        assert_eq!(resync_pattern(vec![Accent], 3), vec![Accent, Normal, Normal]);
        assert_eq!(resync_pattern(Vec::new(), 0), vec![Normal]);
    }

    #[test]
    fn test_gains_are_ordered() {
        assert!(Accent.gain() > Secondary.gain());
        assert!(Secondary.gain() > Normal.gain());
        assert_eq!(Mute.gain(), 0.0);
        assert!(!Mute.is_audible());
    }
}
