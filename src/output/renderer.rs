// Click renderer - Audio-thread side of an audio sink
//
// Pops scheduled clicks from the lock-free queue and mixes them into the
// output at their exact frame. No allocations and no I/O once constructed.
// Each device callback first re-anchors the scheduler clock onto the frame
// counter so the sink can place clicks independently of block boundaries.

use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero, hard_clip};
use crate::audio::format_conversion::interleave_mono;
use crate::audio::parameters::AtomicF32;
use crate::messaging::channels::{CLICK_QUEUE_CAPACITY, ClickConsumer};
use crate::output::sound::ClickSound;
use crate::sequencer::accents::AccentLevel;
use crate::timing::{FrameAnchor, StreamClock};
use cpal::{FromSample, Sample};

/// Overlapping clicks kept alive at once; the oldest is stolen beyond that
const MAX_VOICES: usize = 8;
/// Mono scratch size used when rendering interleaved device buffers
const SCRATCH_FRAMES: usize = 1024;
/// Amplitude glide when volume changes mid-click
const AMPLITUDE_SMOOTHING_MS: f32 = 5.0;

/// A click handed from the sink to the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledClick {
    /// Absolute frame on the renderer's frame clock
    pub at_frame: u64,
    pub level: AccentLevel,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    level: AccentLevel,
    position: f64,
    step: f64,
    gain: f32,
}

pub struct ClickRenderer {
    sound: ClickSound,
    sample_rate: u32,
    queue: ClickConsumer,
    pending: Vec<ScheduledClick>,
    voices: Vec<Voice>,
    frames: StreamClock,
    anchor: Option<FrameAnchor>,
    amplitude: AtomicF32,
    smoother: OnePoleSmoother,
    scratch: Vec<f32>,
}

impl ClickRenderer {
    /// `frames` is advanced after every rendered block; `amplitude` is
    /// written by the owning sink.
    pub fn new(
        sound: ClickSound,
        queue: ClickConsumer,
        frames: StreamClock,
        amplitude: AtomicF32,
    ) -> Self {
        let sample_rate = frames.sample_rate().round().max(1.0) as u32;
        Self {
            smoother: OnePoleSmoother::new(amplitude.get(), AMPLITUDE_SMOOTHING_MS, sample_rate as f32),
            sound,
            sample_rate,
            queue,
            pending: Vec::with_capacity(CLICK_QUEUE_CAPACITY),
            voices: Vec::with_capacity(MAX_VOICES),
            frames,
            anchor: None,
            amplitude,
            scratch: vec![0.0; SCRATCH_FRAMES],
        }
    }

    /// Capture `anchor` at the start of every rendered block
    pub fn with_anchor(mut self, anchor: FrameAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame clock this renderer advances
    pub fn frame_clock(&self) -> &StreamClock {
        &self.frames
    }

    /// Number of clicks currently sounding
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Render a mono block and advance the frame clock by its length
    pub fn render(&mut self, output: &mut [f32]) {
        self.capture_anchor();
        self.render_block(output);
    }

    /// Render into an interleaved device buffer of any cpal sample type
    pub fn render_interleaved<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        self.capture_anchor();
        let channels = channels.max(1);
        let mut scratch = std::mem::take(&mut self.scratch);
        for chunk in data.chunks_mut(SCRATCH_FRAMES * channels) {
            let frames = chunk.len() / channels;
            self.render_block(&mut scratch[..frames]);
            interleave_mono(&scratch[..frames], chunk, channels);
        }
        self.scratch = scratch;
    }

    fn capture_anchor(&self) {
        if let Some(anchor) = &self.anchor {
            anchor.capture();
        }
    }

    fn render_block(&mut self, output: &mut [f32]) {
        while self.pending.len() < self.pending.capacity() {
            match ringbuf::traits::Consumer::try_pop(&mut self.queue) {
                Some(click) => self.pending.push(click),
                None => break,
            }
        }

        let target = self.amplitude.get();
        if self.voices.is_empty() {
            self.smoother.reset(target);
        }

        let start = self.frames.current_sample();
        for (offset, sample) in output.iter_mut().enumerate() {
            self.start_due_clicks(start + offset as u64);

            let sound = &self.sound;
            let mut mix = 0.0;
            self.voices.retain_mut(|voice| {
                match sound
                    .buffer(voice.level)
                    .and_then(|buffer| buffer.sample_at(voice.position))
                {
                    Some(value) => {
                        mix += value * voice.gain;
                        voice.position += voice.step;
                        true
                    }
                    None => false,
                }
            });

            let amplitude = self.smoother.process(target);
            *sample = flush_denormals_to_zero(hard_clip(mix * amplitude));
        }

        self.frames.advance(output.len());
    }

    fn start_due_clicks(&mut self, now: u64) {
        let sound = &self.sound;
        let sample_rate = self.sample_rate;
        let voices = &mut self.voices;

        self.pending.retain(|click| {
            if click.at_frame > now {
                return true;
            }
            if let Some(buffer) = sound.buffer(click.level) {
                if voices.len() == MAX_VOICES {
                    voices.remove(0);
                }
                voices.push(Voice {
                    level: click.level,
                    position: 0.0,
                    step: buffer.step(sample_rate),
                    gain: click.level.gain(),
                });
            }
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::{ClickProducer, create_click_channel};
    use crate::output::sound::{ClickOptions, SoundBuffer};
    use ringbuf::traits::Producer;

    fn renderer(sound: ClickSound, amplitude: f32) -> (ClickRenderer, ClickProducer) {
        let (producer, consumer) = create_click_channel(CLICK_QUEUE_CAPACITY);
        let renderer = ClickRenderer::new(
            sound,
            consumer,
            StreamClock::new(1000.0),
            AtomicF32::new(amplitude),
        );
        (renderer, producer)
    }

    fn square_sound() -> ClickSound {
        ClickSound::from_buffers(
            SoundBuffer::new(vec![1.0; 4], 1000),
            SoundBuffer::new(vec![1.0; 4], 1000),
        )
    }

    #[test]
    fn test_click_starts_at_scheduled_frame() {
        let (mut renderer, mut producer) = renderer(square_sound(), 1.0);
        producer
            .try_push(ScheduledClick { at_frame: 10, level: AccentLevel::Accent })
            .unwrap();

        let mut block = [0.0f32; 32];
        renderer.render(&mut block);

        assert!(block[..10].iter().all(|s| *s == 0.0));
        assert_eq!(&block[10..14], &[1.0, 1.0, 1.0, 1.0]);
        assert!(block[14..].iter().all(|s| *s == 0.0));
        assert_eq!(renderer.frame_clock().current_sample(), 32);
    }

    #[test]
    fn test_click_spans_block_boundary() {
        let (mut renderer, mut producer) = renderer(square_sound(), 1.0);
        producer
            .try_push(ScheduledClick { at_frame: 6, level: AccentLevel::Normal })
            .unwrap();

        let mut first = [0.0f32; 8];
        let mut second = [0.0f32; 8];
        renderer.render(&mut first);
        renderer.render(&mut second);

        let gain = AccentLevel::Normal.gain();
        assert_eq!(&first[6..], &[gain, gain]);
        assert_eq!(&second[..3], &[gain, gain, 0.0]);
    }

    #[test]
    fn test_zero_amplitude_renders_silence() {
        let (mut renderer, mut producer) = renderer(
            ClickSound::synthesized(1000, &ClickOptions::default()),
            0.0,
        );
        producer
            .try_push(ScheduledClick { at_frame: 0, level: AccentLevel::Accent })
            .unwrap();

        let mut block = [1.0f32; 64];
        renderer.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_resampled_playback_uses_fractional_steps() {
        // 500 Hz source on a 1000 Hz clock plays at half speed
        let sound = ClickSound::from_buffers(
            SoundBuffer::new(vec![0.0, 1.0], 500),
            SoundBuffer::new(vec![0.0, 1.0], 500),
        );
        let (mut renderer, mut producer) = renderer(sound, 1.0);
        producer
            .try_push(ScheduledClick { at_frame: 0, level: AccentLevel::Accent })
            .unwrap();

        let mut block = [0.0f32; 4];
        renderer.render(&mut block);
        assert_eq!(block, [0.0, 0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_interleaved_output() {
        let (mut renderer, mut producer) = renderer(square_sound(), 1.0);
        producer
            .try_push(ScheduledClick { at_frame: 1, level: AccentLevel::Accent })
            .unwrap();

        let mut data = [0.0f32; 6];
        renderer.render_interleaved(&mut data, 2);
        assert_eq!(data, [0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(renderer.frame_clock().current_sample(), 3);
    }
}
