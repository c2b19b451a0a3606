// Output module - Tick sinks, their registry and the audio rendering path

pub mod audio_sink;
pub mod backend;
pub mod registry;
pub mod renderer;
pub mod sink;
pub mod sound;

pub use audio_sink::{AudioSink, SoundSourceKind};
pub use backend::{AudioBackend, CpalBackend, OfflineBackend, OfflineOutput};
pub use registry::{OutputRegistry, SharedRegistry, SinkFactory};
pub use renderer::{ClickRenderer, ScheduledClick};
pub use sink::{OutputSink, SinkConfig, SinkErrorEvent, SinkRecord, SinkState};
pub use sound::{ClickOptions, ClickSound, SampleOptions, SoundBuffer};

use thiserror::Error;

/// Sink and registry errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Sink '{0}' is already registered")]
    DuplicateSink(String),

    #[error("Sink '{0}' not found")]
    SinkNotFound(String),

    #[error("No factory registered for sink type '{0}'")]
    UnknownSinkType(String),

    #[error("Sink initialization failed: {0}")]
    Initialization(String),

    #[error("Sink '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("Invalid sink options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Failed to load sample: {0}")]
    SampleLoad(String),

    #[error("Click queue of sink '{0}' is full")]
    QueueFull(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OutputResult<T> = Result<T, OutputError>;
