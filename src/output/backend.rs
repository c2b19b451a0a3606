// Audio backends - Where a ClickRenderer's output goes
//
// CpalBackend plays on a device. cpal::Stream is not Send on every host
// (CoreAudio in particular), so the stream lives on a dedicated thread
// that is parked until the backend closes.
//
// OfflineBackend hands the renderer to the caller, who pulls frames at
// whatever pace it likes (tests, WAV export).

use crate::audio::device::AudioDeviceManager;
use crate::messaging::listeners::ListenerSet;
use crate::output::renderer::ClickRenderer;
use crate::output::{OutputError, OutputResult};
use crate::timing::StreamClock;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Output side of an audio sink
pub trait AudioBackend: Send {
    /// Prepare the output. Returns the frame clock the renderer must advance.
    /// Failures after startup (device loss) are reported through `errors`.
    fn open(&mut self, errors: ListenerSet<OutputError>) -> OutputResult<StreamClock>;

    /// Start pulling audio from `renderer`
    fn start(&mut self, renderer: ClickRenderer) -> OutputResult<()>;

    /// Stop output and drop the renderer. Safe to call when not started.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct StreamFormat {
    sample_rate: u32,
    channels: u16,
    sample_format: SampleFormat,
}

struct StreamWorker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Default (or named) output device through cpal
pub struct CpalBackend {
    device_name: Option<String>,
    format: Option<StreamFormat>,
    errors: ListenerSet<OutputError>,
    worker: Option<StreamWorker>,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            format: None,
            errors: ListenerSet::new(),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self, errors: ListenerSet<OutputError>) -> OutputResult<StreamClock> {
        let device = AudioDeviceManager::new().output_device(self.device_name.as_deref())?;
        let supported = device
            .default_output_config()
            .map_err(|e| OutputError::Device(format!("configuration error: {}", e)))?;

        let format = StreamFormat {
            sample_rate: supported.sample_rate().0,
            channels: supported.channels(),
            sample_format: supported.sample_format(),
        };
        if !matches!(
            format.sample_format,
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
        ) {
            return Err(OutputError::Device(format!(
                "unsupported sample format {:?}; supported formats: F32, I16, U16",
                format.sample_format
            )));
        }

        log::info!(
            "audio device '{}': {} Hz, {} ch, {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.sample_rate,
            format.channels,
            format.sample_format
        );

        self.format = Some(format);
        self.errors = errors;
        Ok(StreamClock::new(format.sample_rate as f64))
    }

    fn start(&mut self, renderer: ClickRenderer) -> OutputResult<()> {
        let format = self
            .format
            .ok_or_else(|| OutputError::Device("backend started before open".to_string()))?;
        self.close();

        let device_name = self.device_name.clone();
        let errors = self.errors.clone();
        let (ready_tx, ready_rx) = bounded::<OutputResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("metronome-audio".to_string())
            .spawn(move || {
                let stream = match play_stream(device_name.as_deref(), format, renderer, errors) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until close() signals or the backend is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker {
                    shutdown: shutdown_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(OutputError::Device("audio thread exited during startup".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            if worker.handle.join().is_err() {
                log::error!("audio thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn play_stream(
    device_name: Option<&str>,
    format: StreamFormat,
    renderer: ClickRenderer,
    errors: ListenerSet<OutputError>,
) -> OutputResult<Stream> {
    let device = AudioDeviceManager::new().output_device(device_name)?;
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = format.channels as usize;

    let stream = match format.sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, renderer, errors),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, renderer, errors),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, renderer, errors),
        other => Err(OutputError::Device(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| OutputError::Device(format!("failed to start stream: {}", e)))?;
    Ok(stream)
}

/// Build an output stream for any sample type; the renderer always works in f32
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    channels: usize,
    mut renderer: ClickRenderer,
    errors: ListenerSet<OutputError>,
) -> OutputResult<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                renderer.render_interleaved(data, channels);
            },
            move |err| {
                log::error!("audio stream error: {}", err);
                errors.emit(&OutputError::Device(err.to_string()));
            },
            None,
        )
        .map_err(|e| OutputError::Device(format!("failed to build stream: {}", e)))
}

type RendererSlot = Arc<Mutex<Option<ClickRenderer>>>;

fn lock_slot(slot: &RendererSlot) -> MutexGuard<'_, Option<ClickRenderer>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend that renders only when the caller pulls frames.
///
/// The renderer advances the given clock, so a scheduler driven by the same
/// `StreamClock` sees time move exactly as fast as audio is produced. Use one
/// offline backend per clock.
pub struct OfflineBackend {
    clock: StreamClock,
    slot: RendererSlot,
}

impl OfflineBackend {
    pub fn new(clock: StreamClock) -> (Self, OfflineOutput) {
        let slot: RendererSlot = Arc::new(Mutex::new(None));
        let output = OfflineOutput {
            clock: clock.clone(),
            slot: Arc::clone(&slot),
        };
        (Self { clock, slot }, output)
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self, _errors: ListenerSet<OutputError>) -> OutputResult<StreamClock> {
        Ok(self.clock.clone())
    }

    fn start(&mut self, renderer: ClickRenderer) -> OutputResult<()> {
        *lock_slot(&self.slot) = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        lock_slot(&self.slot).take();
    }
}

/// Caller-side handle of an `OfflineBackend`
#[derive(Clone)]
pub struct OfflineOutput {
    clock: StreamClock,
    slot: RendererSlot,
}

impl OfflineOutput {
    /// Render `output.len()` mono frames. Without an attached renderer the
    /// block is silent and the clock still advances. Returns whether a
    /// renderer produced the block.
    pub fn render(&self, output: &mut [f32]) -> bool {
        let mut slot = lock_slot(&self.slot);
        match slot.as_mut() {
            Some(renderer) => {
                renderer.render(output);
                true
            }
            None => {
                output.fill(0.0);
                self.clock.advance(output.len());
                false
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    pub fn clock(&self) -> &StreamClock {
        &self.clock
    }
}
