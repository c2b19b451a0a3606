// Control messages - Caller → scheduler thread

use crate::output::SinkConfig;
use crate::sequencer::{AccentLevel, MetronomeConfig, SchedulerResult, Subdivision};
use crate::timing::LifecycleEvent;
use crossbeam_channel::Sender;

/// Reply slot for one-shot operations
pub type Reply = Sender<SchedulerResult<()>>;

#[derive(Debug)]
pub enum Control {
    Initialize {
        config: MetronomeConfig,
        sink: SinkConfig,
        reply: Reply,
    },
    Start(Reply),
    Stop(Reply),
    Dispose(Reply),
    SetTempo(f64),
    SetTimeSignature { beats: u8, note_value: u8 },
    SetSubdivision(Subdivision),
    SetAccents(Vec<AccentLevel>),
    SetVolume(f32),
    SetMuted(bool),
    Lifecycle(LifecycleEvent),
    /// Dispose the scheduler (if still alive) and end the thread
    Shutdown,
}
