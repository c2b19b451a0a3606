// Format conversion between the internal f32 click signal and device/file formats
//
// The renderer always produces mono f32. Devices may want f32, i16 or u16
// interleaved frames; files are read as integer PCM of any bit depth.
// Everything here is allocation-free and safe to call from the audio callback.

use cpal::{FromSample, Sample};

/// Convert an f32 sample to i16, clamping to [-1.0, 1.0] first
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32) as i16
    } else {
        (clamped * -(i16::MIN as f32)) as i16
    }
}

/// Convert a signed integer PCM sample of `bits` width to f32 in [-1.0, 1.0]
#[inline]
pub fn pcm_to_f32(sample: i32, bits: u32) -> f32 {
    let bits = bits.clamp(1, 32);
    let full_scale = (1u64 << (bits - 1)) as f32;
    sample as f32 / full_scale
}

/// Copy one mono sample to every channel of an interleaved frame
#[inline]
pub fn write_mono_frame<T>(sample: f32, frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    let converted = T::from_sample(sample);
    for channel in frame.iter_mut() {
        *channel = converted;
    }
}

/// Spread a mono block across an interleaved device buffer.
/// `output` must hold `mono.len() * channels` samples; extra frames are left untouched.
pub fn interleave_mono<T>(mono: &[f32], output: &mut [T], channels: usize)
where
    T: Sample + FromSample<f32>,
{
    let channels = channels.max(1);
    for (frame, sample) in output.chunks_exact_mut(channels).zip(mono) {
        write_mono_frame(*sample, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_range() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(4.0), i16::MAX);
        assert_eq!(f32_to_i16(-4.0), i16::MIN);
    }

    #[test]
    fn test_pcm_to_f32() {
        assert_eq!(pcm_to_f32(0, 16), 0.0);
        assert_eq!(pcm_to_f32(-32768, 16), -1.0);
        assert!((pcm_to_f32(16384, 16) - 0.5).abs() < 1e-6);
        assert!((pcm_to_f32(-4_194_304, 24) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_interleave_mono_stereo() {
        let mono = [0.5f32, -0.25];
        let mut output = [0.0f32; 4];
        interleave_mono(&mono, &mut output, 2);
        assert_eq!(output, [0.5, 0.5, -0.25, -0.25]);
    }

    #[test]
    fn test_interleave_mono_i16() {
        let mono = [1.0f32, 0.0];
        let mut output = [7i16; 2];
        interleave_mono(&mono, &mut output, 1);
        assert!(output[0] > 32_000);
        assert_eq!(output[1], 0);
    }
}
