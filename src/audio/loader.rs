// Sample loader - Decodes WAV (hound) and FLAC (claxon) click samples
// Multi-channel files are mixed down to mono on load.

use crate::audio::format_conversion::pcm_to_f32;
use crate::output::{OutputError, OutputResult};
use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use std::path::Path;

/// Decoded mono sample
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSample {
    pub name: String,
    pub frames: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source file
    pub channels: u16,
}

impl LoadedSample {
    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Load a sample, picking the decoder from the file extension
pub fn load_sample(path: &Path) -> OutputResult<LoadedSample> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    let sample = match extension.as_str() {
        "wav" | "wave" => load_wav(path)?,
        "flac" => load_flac(path)?,
        other => {
            return Err(OutputError::SampleLoad(format!(
                "unsupported file format '{}' for {}",
                other,
                path.display()
            )));
        }
    };

    if sample.frames.is_empty() {
        return Err(OutputError::SampleLoad(format!(
            "{} contains no audio",
            path.display()
        )));
    }

    log::debug!(
        "loaded sample '{}' ({} frames @ {} Hz, {} ch)",
        sample.name,
        sample.frames.len(),
        sample.sample_rate,
        sample.channels
    );
    Ok(sample)
}

fn load_error(path: &Path, error: impl std::fmt::Display) -> OutputError {
    OutputError::SampleLoad(format!("{}: {}", path.display(), error))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn load_wav(path: &Path) -> OutputResult<LoadedSample> {
    let reader = WavReader::open(path).map_err(|e| load_error(path, e))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| load_error(path, e))?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample as u32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| pcm_to_f32(s, bits)))
                .collect::<Result<_, _>>()
                .map_err(|e| load_error(path, e))?
        }
    };

    Ok(LoadedSample {
        name: file_name(path),
        frames: mix_to_mono(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn load_flac(path: &Path) -> OutputResult<LoadedSample> {
    let mut reader = FlacReader::open(path).map_err(|e| load_error(path, e))?;
    let info = reader.streaminfo();

    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|s| pcm_to_f32(s, info.bits_per_sample)))
        .collect::<Result<_, _>>()
        .map_err(|e| load_error(path, e))?;

    Ok(LoadedSample {
        name: file_name(path),
        frames: mix_to_mono(&interleaved, info.channels as usize),
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

/// Average interleaved channels into one
pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tick.wav");
        write_wav(&path, 1, &[0, 16384, -16384, 0]);

        let sample = load_sample(&path).unwrap();
        assert_eq!(sample.name, "tick.wav");
        assert_eq!(sample.sample_rate, 22050);
        assert_eq!(sample.frames.len(), 4);
        assert!((sample.frames[1] - 0.5).abs() < 1e-4);
        assert!((sample.frames[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_stereo_wav_is_mixed_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.WAV");
        write_wav(&path, 2, &[16384, 0, 16384, 16384]);

        let sample = load_sample(&path).unwrap();
        assert_eq!(sample.channels, 2);
        assert_eq!(sample.frames.len(), 2);
        assert!((sample.frames[0] - 0.25).abs() < 1e-4);
        assert!((sample.frames[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = load_sample(Path::new("click.mp3"));
        assert!(matches!(result, Err(OutputError::SampleLoad(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_sample(&dir.path().join("missing.wav"));
        assert!(matches!(result, Err(OutputError::SampleLoad(_))));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, &[]);
        assert!(matches!(load_sample(&path), Err(OutputError::SampleLoad(_))));
    }
}
