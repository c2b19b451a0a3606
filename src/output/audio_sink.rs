// Audio sink - Turns ticks into scheduled clicks on an audio backend
//
// process_tick never blocks: it converts the tick's clock timestamp into
// a frame through the anchor the renderer captures every block, and pushes
// it to a lock-free queue that the audio thread drains.

use crate::audio::parameters::AtomicF32;
use crate::messaging::channels::{CLICK_QUEUE_CAPACITY, ClickProducer, create_click_channel};
use crate::messaging::listeners::Subscription;
use crate::output::backend::AudioBackend;
use crate::output::renderer::{ClickRenderer, ScheduledClick};
use crate::output::sink::{ErrorHandler, OutputSink, SinkConfig, SinkCore, StateHandler};
use crate::output::sound::{ClickOptions, ClickSound, SampleOptions};
use crate::output::{OutputError, OutputResult};
use crate::sequencer::config::{MetronomeConfig, clamp_volume};
use crate::sequencer::tick::TickEvent;
use std::sync::Arc;
use crate::timing::{FrameAnchor, SharedClock};

/// Where the click sound comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSourceKind {
    /// Synthesized sine bursts
    Click,
    /// Decoded WAV/FLAC files
    Sample,
}

impl SoundSourceKind {
    pub fn tag(&self) -> &'static str {
        match self {
            SoundSourceKind::Click => "click",
            SoundSourceKind::Sample => "sample",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "click" => Some(SoundSourceKind::Click),
            "sample" => Some(SoundSourceKind::Sample),
            _ => None,
        }
    }
}

/// Queue side of a running renderer
struct Playback {
    producer: ClickProducer,
    anchor: FrameAnchor,
}

pub struct AudioSink {
    core: SinkCore,
    source: SoundSourceKind,
    clock: SharedClock,
    backend: Box<dyn AudioBackend>,
    volume: f32,
    muted: bool,
    /// Effective output level shared with the renderer
    amplitude: AtomicF32,
    playback: Option<Playback>,
}

impl AudioSink {
    pub fn new(
        id: impl Into<String>,
        source: SoundSourceKind,
        clock: SharedClock,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        let volume = MetronomeConfig::DEFAULT_VOLUME;
        Self {
            core: SinkCore::new(id, source.tag()),
            source,
            clock,
            backend,
            volume,
            muted: false,
            amplitude: AtomicF32::new(volume),
            playback: None,
        }
    }

    pub fn source(&self) -> SoundSourceKind {
        self.source
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Level the renderer is currently aiming for
    pub fn amplitude(&self) -> f32 {
        self.amplitude.get()
    }

    fn load_sound(&self, config: &SinkConfig, sample_rate: u32) -> OutputResult<ClickSound> {
        match self.source {
            SoundSourceKind::Click => {
                let options: ClickOptions = config.parse_options()?;
                Ok(ClickSound::synthesized(sample_rate, &options))
            }
            SoundSourceKind::Sample => {
                let options: SampleOptions = config.parse_options()?;
                ClickSound::load(&options)
            }
        }
    }

    fn apply_level(&self) {
        let level = if self.muted { 0.0 } else { self.volume };
        self.amplitude.set(level);
    }
}

impl OutputSink for AudioSink {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn kind(&self) -> &str {
        self.core.kind()
    }

    fn initialize(&mut self, config: &SinkConfig) -> OutputResult<()> {
        self.core.ensure_uninitialized()?;

        let frames = self.backend.open(self.core.error_listeners())?;
        let sample_rate = frames.sample_rate().round() as u32;
        let sound = match self.load_sound(config, sample_rate) {
            Ok(sound) => sound,
            Err(e) => {
                self.backend.close();
                return Err(e);
            }
        };

        let (producer, consumer) = create_click_channel(CLICK_QUEUE_CAPACITY);
        let anchor = FrameAnchor::new(Arc::clone(&self.clock), frames.clone());
        let renderer = ClickRenderer::new(sound, consumer, frames, self.amplitude.clone())
            .with_anchor(anchor.clone());
        self.backend.start(renderer)?;

        self.playback = Some(Playback { producer, anchor });
        self.core.set_initialized(true);
        log::debug!("audio sink '{}' initialized at {} Hz", self.core.id(), sample_rate);
        Ok(())
    }

    fn dispose(&mut self) {
        if self.playback.take().is_some() {
            self.backend.close();
            log::debug!("audio sink '{}' disposed", self.core.id());
        }
        self.core.set_initialized(false);
    }

    fn process_tick(&mut self, event: &TickEvent) -> OutputResult<()> {
        if !self.core.is_active() || !event.accent.is_audible() {
            return Ok(());
        }
        let Some(playback) = self.playback.as_mut() else {
            return Ok(());
        };

        let click = ScheduledClick {
            at_frame: playback.anchor.frame_at(event.timestamp),
            level: event.accent,
        };

        ringbuf::traits::Producer::try_push(&mut playback.producer, click)
            .map_err(|_| OutputError::QueueFull(self.core.id().to_string()))
    }

    fn update_config(&mut self, config: &MetronomeConfig) -> OutputResult<()> {
        // Clamped again here; the sink does not trust the caller's range
        self.volume = clamp_volume(config.volume);
        self.muted = config.muted;
        self.apply_level();
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.core.set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.core.on_error(handler)
    }

    fn on_state_change(&self, handler: StateHandler) -> Subscription {
        self.core.on_state_change(handler)
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.dispose();
    }
}
