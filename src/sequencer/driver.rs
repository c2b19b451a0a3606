// Scheduler thread - Runs a BeatScheduler on its own thread
//
// The thread is the scheduler's only writer. Callers send Control messages;
// the thread applies them between polls and waits for the next poll with
// recv_deadline, so a control message never has to wait for a poll slot.

use super::scheduler::{BeatScheduler, SchedulerListeners};
use super::{
    AccentLevel, MetronomeConfig, SchedulerError, SchedulerResult, SchedulerSnapshot,
    SchedulerState, Subdivision, TickEvent,
};
use crate::messaging::Subscription;
use crate::messaging::command::{Control, Reply};
use crate::output::SinkConfig;
use crate::timing::LifecycleEvent;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub struct SchedulerThread {
    control: Sender<Control>,
    listeners: SchedulerListeners,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerThread {
    /// Move `scheduler` onto a new thread
    pub fn spawn(scheduler: BeatScheduler) -> std::io::Result<Self> {
        let listeners = scheduler.listeners();
        let (control, inbox) = unbounded();

        let handle = thread::Builder::new()
            .name("metronome-scheduler".to_string())
            .spawn(move || run(scheduler, inbox))?;

        Ok(Self {
            control,
            listeners,
            handle: Some(handle),
        })
    }

    pub fn initialize(&self, config: MetronomeConfig, sink: SinkConfig) -> SchedulerResult<()> {
        self.request(|reply| Control::Initialize {
            config,
            sink,
            reply,
        })
    }

    pub fn start(&self) -> SchedulerResult<()> {
        self.request(Control::Start)
    }

    pub fn stop(&self) -> SchedulerResult<()> {
        self.request(Control::Stop)
    }

    pub fn dispose(&self) -> SchedulerResult<()> {
        self.request(Control::Dispose)
    }

    pub fn set_tempo(&self, bpm: f64) -> SchedulerResult<()> {
        self.send(Control::SetTempo(bpm))
    }

    pub fn set_time_signature(&self, beats: u8, note_value: u8) -> SchedulerResult<()> {
        self.send(Control::SetTimeSignature { beats, note_value })
    }

    pub fn set_subdivision(&self, subdivision: Subdivision) -> SchedulerResult<()> {
        self.send(Control::SetSubdivision(subdivision))
    }

    pub fn set_accents(&self, levels: Vec<AccentLevel>) -> SchedulerResult<()> {
        self.send(Control::SetAccents(levels))
    }

    pub fn set_volume(&self, volume: f32) -> SchedulerResult<()> {
        self.send(Control::SetVolume(volume))
    }

    pub fn set_muted(&self, muted: bool) -> SchedulerResult<()> {
        self.send(Control::SetMuted(muted))
    }

    pub fn handle_lifecycle(&self, event: LifecycleEvent) -> SchedulerResult<()> {
        self.send(Control::Lifecycle(event))
    }

    pub fn on_tick<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TickEvent) + Send + Sync + 'static,
    {
        self.listeners.on_tick(callback)
    }

    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SchedulerError) + Send + Sync + 'static,
    {
        self.listeners.on_error(callback)
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SchedulerSnapshot) + Send + Sync + 'static,
    {
        self.listeners.on_state_change(callback)
    }

    /// Last snapshot published by the scheduler thread
    pub fn get_current_state(&self) -> SchedulerSnapshot {
        self.listeners.latest_state()
    }

    pub fn get_beat_duration(&self) -> f64 {
        self.get_current_state().beat_duration_ms
    }

    pub fn is_playing(&self) -> bool {
        self.get_current_state().is_playing()
    }

    /// Dispose the scheduler and join the thread
    pub fn shutdown(mut self) {
        self.join();
    }

    /// Setters are applied asynchronously; only a disposed scheduler is
    /// reported here, from the last published snapshot.
    fn send(&self, message: Control) -> SchedulerResult<()> {
        if self.listeners.latest_state().state == SchedulerState::Disposed {
            return Err(SchedulerError::Disposed);
        }
        self.control
            .send(message)
            .map_err(|_| SchedulerError::Disposed)
    }

    fn request<F>(&self, make: F) -> SchedulerResult<()>
    where
        F: FnOnce(Reply) -> Control,
    {
        let (reply, response) = bounded(1);
        self.send(make(reply))?;
        response.recv().unwrap_or(Err(SchedulerError::Disposed))
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.control.send(Control::Shutdown);
            if handle.join().is_err() {
                log::error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.join();
    }
}

fn run(mut scheduler: BeatScheduler, inbox: Receiver<Control>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let received = match deadline {
            Some(at) => inbox.recv_deadline(at),
            None => inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(message) => {
                apply(&mut scheduler, message);
                deadline = match (scheduler.next_poll_delay(), deadline) {
                    (None, _) => None,
                    (Some(_), Some(at)) => Some(at),
                    (Some(delay), None) => Some(Instant::now() + delay),
                };
            }
            Err(RecvTimeoutError::Timeout) => {
                deadline = scheduler.poll().map(|delay| Instant::now() + delay);
            }
        }
    }

    if scheduler.state() != SchedulerState::Disposed
        && let Err(e) = scheduler.dispose()
    {
        log::warn!("scheduler shutdown: {}", e);
    }
}

fn apply(scheduler: &mut BeatScheduler, message: Control) {
    let reply = |reply: Reply, result: SchedulerResult<()>| {
        // The caller may have given up waiting
        let _ = reply.send(result);
    };

    let result = match message {
        Control::Initialize {
            config,
            sink,
            reply: tx,
        } => return reply(tx, scheduler.initialize(config, sink)),
        Control::Start(tx) => return reply(tx, scheduler.start()),
        Control::Stop(tx) => return reply(tx, scheduler.stop()),
        Control::Dispose(tx) => return reply(tx, scheduler.dispose()),
        Control::SetTempo(bpm) => scheduler.set_tempo(bpm),
        Control::SetTimeSignature { beats, note_value } => {
            scheduler.set_time_signature(beats, note_value)
        }
        Control::SetSubdivision(subdivision) => scheduler.set_subdivision(subdivision),
        Control::SetAccents(levels) => scheduler.set_accents(levels),
        Control::SetVolume(volume) => scheduler.set_volume(volume),
        Control::SetMuted(muted) => scheduler.set_muted(muted),
        Control::Lifecycle(event) => scheduler.handle_lifecycle(event),
        Control::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        log::warn!("scheduler command failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputRegistry, SharedRegistry};
    use crate::timing::SystemClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> SharedRegistry {
        OutputRegistry::new().into_shared()
    }

    #[test]
    fn test_commands_before_initialize() {
        let thread =
            SchedulerThread::spawn(BeatScheduler::new(Arc::new(SystemClock::new()), registry()))
                .unwrap();

        assert!(matches!(thread.start(), Err(SchedulerError::NotInitialized)));
        thread.set_tempo(90.0).unwrap();
        // request round-trips are ordered after earlier sends
        thread.stop().unwrap();
        assert_eq!(thread.get_current_state().config.tempo.bpm(), 90.0);
        assert_eq!(thread.get_beat_duration(), 60000.0 / 90.0);
        thread.shutdown();
    }

    #[test]
    fn test_disposed_thread_rejects_requests() {
        let thread =
            SchedulerThread::spawn(BeatScheduler::new(Arc::new(SystemClock::new()), registry()))
                .unwrap();
        thread.dispose().unwrap();
        assert!(matches!(thread.start(), Err(SchedulerError::Disposed)));
        assert_eq!(thread.get_current_state().state, SchedulerState::Disposed);
    }

    #[test]
    fn test_setters_after_dispose_report_disposed() {
        let thread =
            SchedulerThread::spawn(BeatScheduler::new(Arc::new(SystemClock::new()), registry()))
                .unwrap();
        thread.set_tempo(100.0).unwrap();
        thread.dispose().unwrap();

        assert!(matches!(thread.set_tempo(90.0), Err(SchedulerError::Disposed)));
        assert!(matches!(thread.set_muted(true), Err(SchedulerError::Disposed)));
        assert!(matches!(
            thread.set_subdivision(Subdivision::Eighth),
            Err(SchedulerError::Disposed)
        ));
        assert!(matches!(
            thread.handle_lifecycle(LifecycleEvent::Suspended),
            Err(SchedulerError::Disposed)
        ));
        assert_eq!(thread.get_current_state().config.tempo.bpm(), 100.0);
    }

    #[test]
    fn test_thread_polls_while_playing() {
        use crate::output::sink::{ErrorHandler, OutputSink, SinkCore, StateHandler};
        use crate::output::OutputResult;

        struct NullSink(SinkCore);

        impl OutputSink for NullSink {
            fn id(&self) -> &str {
                self.0.id()
            }
            fn kind(&self) -> &str {
                self.0.kind()
            }
            fn initialize(&mut self, _config: &SinkConfig) -> OutputResult<()> {
                self.0.set_initialized(true);
                Ok(())
            }
            fn dispose(&mut self) {
                self.0.set_initialized(false);
            }
            fn process_tick(&mut self, _event: &TickEvent) -> OutputResult<()> {
                Ok(())
            }
            fn update_config(&mut self, _config: &MetronomeConfig) -> OutputResult<()> {
                Ok(())
            }
            fn set_enabled(&mut self, enabled: bool) {
                self.0.set_enabled(enabled);
            }
            fn is_enabled(&self) -> bool {
                self.0.is_enabled()
            }
            fn is_initialized(&self) -> bool {
                self.0.is_initialized()
            }
            fn on_error(&self, handler: ErrorHandler) -> Subscription {
                self.0.on_error(handler)
            }
            fn on_state_change(&self, handler: StateHandler) -> Subscription {
                self.0.on_state_change(handler)
            }
        }

        let mut registry = OutputRegistry::new();
        registry.register_factory(
            "null",
            Box::new(|config: &SinkConfig| {
                Ok(Box::new(NullSink(SinkCore::new(config.id.clone(), config.kind.clone())))
                    as Box<dyn OutputSink>)
            }),
        );
        let thread = SchedulerThread::spawn(BeatScheduler::new(
            Arc::new(SystemClock::new()),
            registry.into_shared(),
        ))
        .unwrap();

        let (tx, rx) = bounded(16);
        let _subscription = thread.on_tick(move |tick| {
            let _ = tx.try_send(tick.beat_number);
        });

        let config = MetronomeConfig::new(500.0, Default::default());
        thread.initialize(config, SinkConfig::new("null", "null")).unwrap();
        thread.start().unwrap();
        assert!(thread.is_playing());

        // 500 BPM: beats every 120 ms; the second beat needs a timed poll
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1.0);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2.0);

        thread.stop().unwrap();
        assert!(!thread.is_playing());
    }
}
