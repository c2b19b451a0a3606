// Timing module - Clock sources driving the beat scheduler
//
// The scheduler never reads wall-clock time directly: it asks a
// ClockSource for "now", the way a browser metronome asks its audio
// context. Three clocks are provided:
// - SystemClock: monotonic wall clock with suspend/resume
// - StreamClock: sample counter advanced by an audio renderer
// - ManualClock: externally driven, for tests and offline rendering

pub mod clock;
pub mod manual;
pub mod stream;
pub mod system;

pub use clock::{ClockSource, ClockState, LifecycleEvent, SharedClock};
pub use manual::ManualClock;
pub use stream::{FrameAnchor, StreamClock};
pub use system::SystemClock;
