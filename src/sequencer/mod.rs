// Sequencer module - Metronome configuration, tick model and the look-ahead
// beat scheduler

pub mod accents;
pub mod config;
pub mod driver;
pub mod scheduler;
pub mod tick;
pub mod timeline;

pub use accents::{AccentLevel, MeterClass, default_pattern};
pub use config::MetronomeConfig;
pub use driver::SchedulerThread;
pub use scheduler::{BeatScheduler, POLL_INTERVAL, RESYNC_GUARD, SCHEDULE_AHEAD, SchedulerListeners};
pub use tick::{TickEvent, TickKind};
pub use timeline::{Subdivision, Tempo, TimeSignature};

use crate::output::{OutputError, SinkErrorEvent};
use serde::Serialize;
use thiserror::Error;

/// Scheduler errors, delivered to error listeners and returned by one-shot calls
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler initialization failed: {0}")]
    Initialization(#[source] OutputError),

    #[error("Scheduler is not initialized")]
    NotInitialized,

    #[error("Scheduler has been disposed")]
    Disposed,

    #[error("Tick dispatch to sink '{sink}' failed: {source}")]
    TickDispatch {
        sink: String,
        #[source]
        source: OutputError,
    },

    #[error("Output registry error: {0}")]
    Registry(#[from] OutputError),

    #[error("Sink '{}' reported: {}", .0.sink_id, .0.message)]
    Sink(SinkErrorEvent),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Lifecycle state of a beat scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    #[default]
    Uninitialized,
    Ready,
    Playing,
    Disposed,
}

/// Immutable view of the scheduler, emitted on every state or config change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub state: SchedulerState,
    pub config: MetronomeConfig,
    pub beat_index: usize,
    pub measure: u32,
    pub beat_duration_ms: f64,
}

impl SchedulerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state == SchedulerState::Playing
    }
}
