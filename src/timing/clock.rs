// Clock source abstraction

use std::sync::Arc;

/// Execution state of a clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Running,
    Suspended,
}

/// Host lifecycle signal (page visibility, device sleep, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Suspended,
    Resumed,
}

/// Monotonic time source with a suspendable execution context
///
/// `now()` must be non-decreasing across calls within one session.
/// State changes use interior mutability so a clock can be shared
/// between the scheduler and an audio renderer.
pub trait ClockSource: Send + Sync {
    /// Current time in seconds
    fn now(&self) -> f64;

    fn state(&self) -> ClockState;

    fn suspend(&self);

    fn resume(&self);

    fn is_suspended(&self) -> bool {
        self.state() == ClockState::Suspended
    }
}

pub type SharedClock = Arc<dyn ClockSource>;
