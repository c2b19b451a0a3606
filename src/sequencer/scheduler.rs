// Beat scheduler - Look-ahead loop turning a metronome config into ticks
//
// Every poll computes all ticks due before `now + SCHEDULE_AHEAD` and hands
// them to the output registry, then asks to be polled again after
// POLL_INTERVAL. Because the window is four times the poll interval, a late
// poll never shifts the beat grid: the ticks were already committed with
// their exact timestamps.

use super::accents::{self, AccentLevel};
use super::config::{MetronomeConfig, clamp_volume};
use super::tick::{TickEvent, TickKind};
use super::timeline::{Subdivision, Tempo, TimeSignature};
use super::{SchedulerError, SchedulerResult, SchedulerSnapshot, SchedulerState};
use crate::messaging::{ListenerSet, Notifier, Subscription};
use crate::output::{OutputError, OutputRegistry, SharedRegistry, SinkConfig, SinkErrorEvent};
use crate::timing::{LifecycleEvent, SharedClock};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How far ahead of the clock ticks are committed, in seconds
pub const SCHEDULE_AHEAD: f64 = 0.1;
/// Delay between two polls while playing
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Offset applied when a stale beat time is moved forward after a stall
pub const RESYNC_GUARD: f64 = 0.05;

/// Listener channels of a scheduler.
///
/// Clones share the same listener sets, so observers can register from any
/// thread while the scheduler itself runs elsewhere.
#[derive(Clone)]
pub struct SchedulerListeners {
    ticks: ListenerSet<TickEvent>,
    errors: ListenerSet<SchedulerError>,
    snapshots: Notifier<SchedulerSnapshot>,
}

impl SchedulerListeners {
    fn new(initial: SchedulerSnapshot) -> Self {
        Self {
            ticks: ListenerSet::new(),
            errors: ListenerSet::new(),
            snapshots: Notifier::new(initial),
        }
    }

    pub fn on_tick<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TickEvent) + Send + Sync + 'static,
    {
        self.ticks.subscribe(callback)
    }

    /// Error listeners never run while the scheduler holds the output
    /// registry, so they may lock it (to switch sinks, for instance).
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SchedulerError) + Send + Sync + 'static,
    {
        self.errors.subscribe(callback)
    }

    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SchedulerSnapshot) + Send + Sync + 'static,
    {
        self.snapshots.subscribe(callback)
    }

    /// Most recently published snapshot
    pub fn latest_state(&self) -> SchedulerSnapshot {
        self.snapshots.latest()
    }
}

/// Sink reports held back while the scheduler holds the registry lock
#[derive(Debug, Default)]
struct HeldErrors {
    holding: bool,
    queue: Vec<SinkErrorEvent>,
}

fn lock_held(held: &Mutex<HeldErrors>) -> MutexGuard<'_, HeldErrors> {
    held.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BeatScheduler {
    clock: Option<SharedClock>,
    registry: SharedRegistry,
    config: MetronomeConfig,
    state: SchedulerState,
    sink_id: Option<String>,

    beat_index: usize,
    measure: u32,
    /// Clock time of the next main beat
    next_note_time: f64,
    /// Pending poll re-arm; None when the loop is cancelled
    armed: Option<Duration>,

    listeners: SchedulerListeners,
    sink_errors: Option<Subscription>,
    held_errors: Arc<Mutex<HeldErrors>>,
}

impl BeatScheduler {
    pub fn new(clock: SharedClock, registry: SharedRegistry) -> Self {
        let config = MetronomeConfig::default();
        let initial = SchedulerSnapshot {
            state: SchedulerState::Uninitialized,
            beat_duration_ms: config.beat_duration_ms(),
            config: config.clone(),
            beat_index: 0,
            measure: 1,
        };

        Self {
            clock: Some(clock),
            registry,
            config,
            state: SchedulerState::Uninitialized,
            sink_id: None,
            beat_index: 0,
            measure: 1,
            next_note_time: 0.0,
            armed: None,
            listeners: SchedulerListeners::new(initial),
            sink_errors: None,
            held_errors: Arc::new(Mutex::new(HeldErrors::default())),
        }
    }

    /// Store `config`, resolve or create the sink described by `sink`, make
    /// it the active sink and push the config to every sink. A previously
    /// attached sink with another id is removed from the registry.
    ///
    /// On failure the scheduler keeps its previous state and config.
    pub fn initialize(&mut self, config: MetronomeConfig, sink: SinkConfig) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let config = config.normalized();

        if let Err(e) = self.attach_sink(&config, &sink) {
            return Err(self.fail(SchedulerError::Initialization(e)));
        }

        self.config = config;
        self.watch_sink_errors(&sink.id);
        if let Some(previous) = self.sink_id.replace(sink.id.clone())
            && previous != sink.id
        {
            let (removed, held) = self.with_registry(|registry| registry.remove_source(&previous));
            self.report_sink_errors(held);
            if let Err(e) = removed {
                self.fail(SchedulerError::Registry(e));
            } else {
                log::info!("released previous sink '{}'", previous);
            }
        }
        if self.state == SchedulerState::Uninitialized {
            self.state = SchedulerState::Ready;
        }

        log::info!(
            "scheduler initialized: {} BPM {} {}, sink '{}'",
            self.config.tempo.bpm(),
            self.config.time_signature,
            self.config.subdivision,
            sink.id
        );
        self.publish();
        Ok(())
    }

    /// Start the look-ahead loop. Does nothing while already playing.
    pub fn start(&mut self) -> SchedulerResult<()> {
        match self.state {
            SchedulerState::Playing => return Ok(()),
            SchedulerState::Disposed => return Err(self.fail(SchedulerError::Disposed)),
            SchedulerState::Uninitialized => {
                return Err(self.fail(SchedulerError::NotInitialized));
            }
            SchedulerState::Ready => {}
        }
        let Some(clock) = self.clock.clone() else {
            return Err(self.fail(SchedulerError::NotInitialized));
        };

        if clock.is_suspended() {
            clock.resume();
        }
        self.reset_counters();
        let now = clock.now();
        self.next_note_time = now;
        self.state = SchedulerState::Playing;
        self.armed = Some(POLL_INTERVAL);

        log::info!("metronome started at {:.3}s", now);
        self.publish();
        self.run_window(now);
        Ok(())
    }

    /// Stop the loop and rewind to beat 1 of measure 1. Clicks already
    /// handed to a sink still play.
    pub fn stop(&mut self) -> SchedulerResult<()> {
        match self.state {
            SchedulerState::Playing => {}
            SchedulerState::Disposed => return Err(self.fail(SchedulerError::Disposed)),
            SchedulerState::Uninitialized | SchedulerState::Ready => return Ok(()),
        }

        self.armed = None;
        self.reset_counters();
        self.state = SchedulerState::Ready;
        log::info!("metronome stopped");

        let (reset, held) = self.with_registry(|registry| registry.reset());
        self.report_sink_errors(held);
        self.publish();
        reset.map_err(|e| self.fail(SchedulerError::Registry(e)))
    }

    /// One loop iteration. Returns the delay before the next poll, or None
    /// when the loop is not running.
    pub fn poll(&mut self) -> Option<Duration> {
        if self.state != SchedulerState::Playing {
            self.armed = None;
            return None;
        }
        let clock = self.clock.clone()?;

        if !clock.is_suspended() {
            let now = clock.now();
            self.resync(now);
            self.run_window(now);
        }
        self.armed = Some(POLL_INTERVAL);
        self.armed
    }

    /// Delay of the pending poll, if the loop is armed
    pub fn next_poll_delay(&self) -> Option<Duration> {
        self.armed
    }

    /// Host visibility or device-sleep signal
    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let Some(clock) = self.clock.clone() else {
            return Err(SchedulerError::Disposed);
        };

        match event {
            LifecycleEvent::Suspended => {
                clock.suspend();
                log::debug!("clock suspended at {:.3}s", clock.now());
            }
            LifecycleEvent::Resumed => {
                clock.resume();
                if self.state == SchedulerState::Playing {
                    self.resync(clock.now());
                }
                log::debug!("clock resumed at {:.3}s", clock.now());
            }
        }
        Ok(())
    }

    pub fn set_tempo(&mut self, bpm: f64) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let tempo = Tempo::new(bpm);
        if tempo == self.config.tempo {
            return Ok(());
        }
        self.config.tempo = tempo;
        self.config_changed()
    }

    /// Change the meter. Rewinds the counters and restores the meter's
    /// default accent pattern.
    pub fn set_time_signature(&mut self, beats: u8, note_value: u8) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let time_signature = TimeSignature::new(beats, note_value);
        if time_signature == self.config.time_signature {
            return Ok(());
        }
        self.config.time_signature = time_signature;
        self.config.accents = accents::default_pattern(&time_signature);
        self.reset_counters();
        self.config_changed()
    }

    pub fn set_subdivision(&mut self, subdivision: Subdivision) -> SchedulerResult<()> {
        self.ensure_alive()?;
        if subdivision == self.config.subdivision {
            return Ok(());
        }
        self.config.subdivision = subdivision;
        self.config_changed()
    }

    /// Replace the accent pattern, truncated or padded with Normal to the
    /// current measure length
    pub fn set_accents(&mut self, levels: Vec<AccentLevel>) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let levels = accents::resync_pattern(levels, self.config.beats_per_measure());
        if levels == self.config.accents {
            return Ok(());
        }
        self.config.accents = levels;
        self.config_changed()
    }

    pub fn set_volume(&mut self, volume: f32) -> SchedulerResult<()> {
        self.ensure_alive()?;
        let volume = clamp_volume(volume);
        if volume == self.config.volume {
            return Ok(());
        }
        self.config.volume = volume;
        self.config_changed()
    }

    pub fn set_muted(&mut self, muted: bool) -> SchedulerResult<()> {
        self.ensure_alive()?;
        if muted == self.config.muted {
            return Ok(());
        }
        self.config.muted = muted;
        self.config_changed()
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

    /// Shared handle on the listener channels
    pub fn listeners(&self) -> SchedulerListeners {
        self.listeners.clone()
    }

    pub fn get_current_state(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state,
            config: self.config.clone(),
            beat_index: self.beat_index,
            measure: self.measure,
            beat_duration_ms: self.get_beat_duration(),
        }
    }

    /// Last published snapshot
    pub fn latest_state(&self) -> SchedulerSnapshot {
        self.listeners.latest_state()
    }

    /// Beat length in milliseconds
    pub fn get_beat_duration(&self) -> f64 {
        self.config.beat_duration_ms()
    }

    pub fn is_playing(&self) -> bool {
        self.state == SchedulerState::Playing
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn config(&self) -> &MetronomeConfig {
        &self.config
    }

    pub fn sink_id(&self) -> Option<&str> {
        self.sink_id.as_deref()
    }

    /// Clock time of the next main beat
    pub fn next_note_time(&self) -> f64 {
        self.next_note_time
    }

    /// Stop, release the sink and the clock. The scheduler cannot be used
    /// afterwards. Listener registrations are left in place.
    pub fn dispose(&mut self) -> SchedulerResult<()> {
        self.ensure_alive()?;

        let stopped = if self.is_playing() { self.stop() } else { Ok(()) };

        let removed = match self.sink_id.take() {
            Some(id) => {
                let (removed, held) = self.with_registry(|registry| registry.remove_source(&id));
                self.report_sink_errors(held);
                removed
            }
            None => Ok(()),
        };
        if let Some(subscription) = self.sink_errors.take() {
            subscription.unsubscribe();
        }
        self.clock = None;
        self.armed = None;
        self.state = SchedulerState::Disposed;

        log::info!("scheduler disposed");
        self.publish();

        stopped?;
        removed.map_err(|e| self.fail(SchedulerError::Registry(e)))
    }

    fn registry(&self) -> MutexGuard<'_, OutputRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` on the locked registry. Reports our sink raises meanwhile
    /// are held back and returned once the lock is released.
    fn with_registry<R>(
        &self,
        op: impl FnOnce(&mut OutputRegistry) -> R,
    ) -> (R, Vec<SinkErrorEvent>) {
        lock_held(&self.held_errors).holding = true;
        let result = {
            let mut registry = self.registry();
            op(&mut registry)
        };
        let mut held = lock_held(&self.held_errors);
        held.holding = false;
        (result, std::mem::take(&mut held.queue))
    }

    fn report_sink_errors(&self, events: Vec<SinkErrorEvent>) {
        for event in events {
            let error = SchedulerError::Sink(event);
            log::warn!("{}", error);
            self.listeners.errors.emit(&error);
        }
    }

    fn ensure_alive(&self) -> SchedulerResult<()> {
        if self.state == SchedulerState::Disposed {
            return Err(SchedulerError::Disposed);
        }
        Ok(())
    }

    /// Report an error to error listeners and hand it back for returning
    fn fail(&self, error: SchedulerError) -> SchedulerError {
        log::warn!("{}", error);
        self.listeners.errors.emit(&error);
        error
    }

    fn publish(&self) {
        self.listeners.snapshots.publish(self.get_current_state());
    }

    fn reset_counters(&mut self) {
        self.beat_index = 0;
        self.measure = 1;
    }

    fn attach_sink(&self, config: &MetronomeConfig, sink: &SinkConfig) -> Result<(), OutputError> {
        let (attached, held) = self.with_registry(|registry| {
            match registry.get(&sink.id) {
                Some(record) if record.kind != sink.kind => {
                    return Err(OutputError::DuplicateSink(sink.id.clone()));
                }
                Some(_) => {}
                None => {
                    registry.create_source(sink.clone())?;
                }
            }
            registry.set_active_source(&sink.id)?;
            registry.update_config(config)
        });
        self.report_sink_errors(held);
        attached
    }

    fn watch_sink_errors(&mut self, sink_id: &str) {
        if let Some(previous) = self.sink_errors.take() {
            previous.unsubscribe();
        }
        let errors = self.listeners.errors.clone();
        let held_errors = Arc::clone(&self.held_errors);
        let sink_id = sink_id.to_string();
        let subscription = self.registry().on_error(move |event| {
            if event.sink_id != sink_id {
                return;
            }
            {
                let mut held = lock_held(&held_errors);
                if held.holding {
                    held.queue.push(event.clone());
                    return;
                }
            }
            errors.emit(&SchedulerError::Sink(event.clone()));
        });
        self.sink_errors = Some(subscription);
    }

    fn config_changed(&mut self) -> SchedulerResult<()> {
        let update = if self.sink_id.is_some() {
            let (update, held) = self.with_registry(|registry| registry.update_config(&self.config));
            self.report_sink_errors(held);
            update
        } else {
            Ok(())
        };
        self.publish();
        update.map_err(|e| self.fail(SchedulerError::Registry(e)))
    }

    /// Move a stale beat time forward instead of replaying missed beats
    fn resync(&mut self, now: f64) {
        if self.next_note_time < now {
            log::debug!(
                "beat time {:.3}s is behind the clock ({:.3}s); resyncing",
                self.next_note_time,
                now
            );
            self.next_note_time = now + RESYNC_GUARD;
        }
    }

    fn run_window(&mut self, now: f64) {
        let horizon = now + SCHEDULE_AHEAD;
        while self.next_note_time < horizon {
            self.schedule_beat();
        }
    }

    /// Dispatch the main beat at `next_note_time` and its subdivisions, then
    /// advance to the next beat
    fn schedule_beat(&mut self) {
        let beat_seconds = self.config.tempo.beat_duration_seconds();
        let time = self.next_note_time;
        let next_beat_time = time + beat_seconds;
        let beat_number = (self.beat_index + 1) as f64;

        let main = self.tick(
            time,
            beat_number,
            0,
            self.config.accent_for(self.beat_index),
            next_beat_time,
        );
        self.dispatch(&main);

        for (slot, offset) in self.config.subdivision.offsets().iter().enumerate() {
            let sub = self.tick(
                time + offset * beat_seconds,
                beat_number + offset,
                (slot + 1) as u8,
                AccentLevel::Normal,
                next_beat_time,
            );
            self.dispatch(&sub);
        }

        self.next_note_time = next_beat_time;
        self.beat_index = (self.beat_index + 1) % self.config.beats_per_measure();
        if self.beat_index == 0 {
            self.measure += 1;
        }
    }

    fn tick(
        &self,
        timestamp: f64,
        beat_number: f64,
        subdivision_index: u8,
        accent: AccentLevel,
        next_beat_time: f64,
    ) -> TickEvent {
        TickEvent {
            kind: TickKind::Beat,
            timestamp,
            beat_number,
            subdivision_index,
            measure_number: self.measure,
            tempo: self.config.tempo,
            time_signature: self.config.time_signature,
            subdivision: self.config.subdivision,
            accent,
            beat_duration_ms: self.config.beat_duration_ms(),
            next_beat_time,
        }
    }

    /// Sink first, look-ahead hook for main beats, then tick listeners.
    /// Failures are reported once the registry is released and never stop
    /// the loop. A failed tick is reported once, as `TickDispatch`, even
    /// when the sink also raised it on its own error channel.
    fn dispatch(&mut self, event: &TickEvent) {
        let (failures, mut held) = self.with_registry(|registry| {
            let mut failures = Vec::new();
            if let Err(source) = registry.dispatch_tick(event) {
                let sink = registry.dispatch_target().unwrap_or("unknown").to_string();
                failures.push(SchedulerError::TickDispatch { sink, source });
            }
            if event.is_main_beat()
                && let Err(e) = registry.prepare_next_tick(event.next_beat_time)
            {
                failures.push(SchedulerError::Registry(e));
            }
            failures
        });

        if let Some(SchedulerError::TickDispatch { sink, source }) = failures.first() {
            let message = source.to_string();
            held.retain(|event| !(event.sink_id == *sink && event.message == message));
        }
        self.report_sink_errors(held);
        for failure in &failures {
            log::warn!("{}", failure);
            self.listeners.errors.emit(failure);
        }
        self.listeners.ticks.emit(event);
    }
}
