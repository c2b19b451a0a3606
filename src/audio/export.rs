// WAV export - Writes an offline click render to disk

use crate::audio::format_conversion::f32_to_i16;
use crate::output::{OutputError, OutputResult};
use hound::{WavSpec, WavWriter};
use std::path::Path;

/// Write mono f32 samples as a 16-bit PCM WAV file
pub fn export_wav(path: &Path, samples: &[f32], sample_rate: u32) -> OutputResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(export_error)?;
    for sample in samples {
        writer.write_sample(f32_to_i16(*sample)).map_err(export_error)?;
    }
    writer.finalize().map_err(export_error)?;

    log::info!(
        "exported {:.2}s to {}",
        samples.len() as f64 / sample_rate.max(1) as f64,
        path.display()
    );
    Ok(())
}

fn export_error(error: hound::Error) -> OutputError {
    match error {
        hound::Error::IoError(e) => OutputError::Io(e),
        other => OutputError::Device(format!("WAV export failed: {}", other)),
    }
}
