// Metronome engine - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod messaging;
pub mod output;
pub mod sequencer;
pub mod timing;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigError};
pub use messaging::{ListenerSet, Notifier, Subscription};
pub use output::{
    AudioSink, OfflineBackend, OfflineOutput, OutputError, OutputRegistry, OutputSink,
    SharedRegistry, SinkConfig, SoundSourceKind,
};
pub use sequencer::{
    AccentLevel, BeatScheduler, MetronomeConfig, SchedulerError, SchedulerSnapshot,
    SchedulerState, SchedulerThread, Subdivision, Tempo, TickEvent, TimeSignature,
};
pub use timing::{ClockSource, LifecycleEvent, ManualClock, SharedClock, StreamClock, SystemClock};
