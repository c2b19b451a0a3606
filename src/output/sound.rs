// Click sounds - Synthesized sine bursts or decoded samples, one buffer per accent level

use crate::audio::loader::{LoadedSample, load_sample};
use crate::output::{OutputError, OutputResult};
use crate::sequencer::accents::AccentLevel;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::PathBuf;

/// Options of the "click" sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickOptions {
    pub accent_frequency: f32,
    pub secondary_frequency: f32,
    pub normal_frequency: f32,
    pub click_ms: f32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            accent_frequency: 1200.0,
            secondary_frequency: 1000.0,
            normal_frequency: 800.0,
            click_ms: 10.0,
        }
    }
}

/// Options of the "sample" sink. A missing path reuses the other one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleOptions {
    pub accent_path: Option<PathBuf>,
    pub normal_path: Option<PathBuf>,
}

/// Mono buffer with its native sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    frames: Vec<f32>,
    sample_rate: u32,
}

impl SoundBuffer {
    pub fn new(frames: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Read-position increment per output frame at `device_rate`
    pub fn step(&self, device_rate: u32) -> f64 {
        self.sample_rate as f64 / device_rate.max(1) as f64
    }

    /// Linearly interpolated value at a fractional position, None past the end
    #[inline]
    pub fn sample_at(&self, position: f64) -> Option<f32> {
        if position < 0.0 {
            return None;
        }
        let index = position as usize;
        let current = *self.frames.get(index)?;
        let next = self.frames.get(index + 1).copied().unwrap_or(0.0);
        let fraction = position.fract() as f32;
        Some(current + (next - current) * fraction)
    }
}

impl From<LoadedSample> for SoundBuffer {
    fn from(sample: LoadedSample) -> Self {
        Self::new(sample.frames, sample.sample_rate)
    }
}

/// The three audible voices of a sink
#[derive(Debug, Clone, PartialEq)]
pub struct ClickSound {
    accent: SoundBuffer,
    secondary: SoundBuffer,
    normal: SoundBuffer,
}

impl ClickSound {
    /// Sine bursts with a fast exponential decay, generated at the device rate
    pub fn synthesized(sample_rate: u32, options: &ClickOptions) -> Self {
        let length = ((options.click_ms.max(1.0) / 1000.0) * sample_rate as f32) as usize;
        let click = |frequency: f32| {
            SoundBuffer::new(
                generate_click(sample_rate as f32, length.max(1), frequency),
                sample_rate,
            )
        };

        Self {
            accent: click(options.accent_frequency),
            secondary: click(options.secondary_frequency),
            normal: click(options.normal_frequency),
        }
    }

    /// Decode the configured sample files
    pub fn load(options: &SampleOptions) -> OutputResult<Self> {
        let (accent_path, normal_path) = match (&options.accent_path, &options.normal_path) {
            (Some(accent), Some(normal)) => (accent, normal),
            (Some(only), None) | (None, Some(only)) => (only, only),
            (None, None) => {
                return Err(OutputError::Initialization(
                    "sample sink needs accent_path or normal_path".to_string(),
                ));
            }
        };

        let accent = SoundBuffer::from(load_sample(accent_path)?);
        let normal = if normal_path == accent_path {
            accent.clone()
        } else {
            SoundBuffer::from(load_sample(normal_path)?)
        };
        Ok(Self::from_buffers(accent, normal))
    }

    /// Sample sounds have no dedicated secondary buffer; the accent one is reused
    pub fn from_buffers(accent: SoundBuffer, normal: SoundBuffer) -> Self {
        Self {
            secondary: accent.clone(),
            accent,
            normal,
        }
    }

    /// Buffer for an accent level; `Mute` has none
    pub fn buffer(&self, level: AccentLevel) -> Option<&SoundBuffer> {
        match level {
            AccentLevel::Accent => Some(&self.accent),
            AccentLevel::Secondary => Some(&self.secondary),
            AccentLevel::Normal => Some(&self.normal),
            AccentLevel::Mute => None,
        }
    }
}

fn generate_click(sample_rate: f32, num_samples: usize, frequency: f32) -> Vec<f32> {
    let phase_increment = 2.0 * PI * frequency / sample_rate;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / num_samples as f32;
            let envelope = (-t * 8.0).exp();
            (i as f32 * phase_increment).sin() * envelope
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_lengths() {
        let sound = ClickSound::synthesized(48000, &ClickOptions::default());
        assert_eq!(sound.buffer(AccentLevel::Accent).unwrap().len(), 480);
        assert_eq!(sound.buffer(AccentLevel::Normal).unwrap().sample_rate(), 48000);
        assert!(sound.buffer(AccentLevel::Mute).is_none());
    }

    #[test]
    fn test_click_starts_at_zero_and_decays() {
        let sound = ClickSound::synthesized(48000, &ClickOptions::default());
        let accent = sound.buffer(AccentLevel::Accent).unwrap();
        assert_eq!(accent.sample_at(0.0), Some(0.0));

        let peak_head = (0..48)
            .filter_map(|i| accent.sample_at(i as f64))
            .fold(0.0f32, |max, s| max.max(s.abs()));
        let peak_tail = (432..480)
            .filter_map(|i| accent.sample_at(i as f64))
            .fold(0.0f32, |max, s| max.max(s.abs()));
        assert!(peak_head > peak_tail);
    }

    #[test]
    fn test_linear_interpolation() {
        let buffer = SoundBuffer::new(vec![0.0, 1.0, 0.0], 22050);
        assert_eq!(buffer.sample_at(0.5), Some(0.5));
        assert_eq!(buffer.sample_at(1.25), Some(0.75));
        assert_eq!(buffer.sample_at(3.0), None);
        assert_eq!(buffer.step(44100), 0.5);
    }

    #[test]
    fn test_sample_sound_requires_a_path() {
        assert!(matches!(
            ClickSound::load(&SampleOptions::default()),
            Err(OutputError::Initialization(_))
        ));
    }

    #[test]
    fn test_buffers_reuse_accent_for_secondary() {
        let accent = SoundBuffer::new(vec![1.0], 44100);
        let normal = SoundBuffer::new(vec![0.5], 44100);
        let sound = ClickSound::from_buffers(accent.clone(), normal);
        assert_eq!(sound.buffer(AccentLevel::Secondary), Some(&accent));
    }
}
