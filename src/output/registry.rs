// Output registry - Owns sink instances and routes ticks to the active one
//
// At most one sink is enabled after set_active_source. Ticks go to the
// active sink (or the most recently created one when none is active);
// configuration updates go to every registered sink.

use crate::messaging::listeners::{ListenerSet, Subscription};
use crate::output::audio_sink::{AudioSink, SoundSourceKind};
use crate::output::backend::CpalBackend;
use crate::output::sink::{OutputSink, SinkConfig, SinkErrorEvent, SinkRecord};
use crate::output::{OutputError, OutputResult};
use crate::sequencer::config::MetronomeConfig;
use crate::sequencer::tick::TickEvent;
use crate::timing::SharedClock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Builds an uninitialized sink from its config
pub type SinkFactory = Box<dyn Fn(&SinkConfig) -> OutputResult<Box<dyn OutputSink>> + Send + Sync>;

/// Registry handle shared between the scheduler and its owner
pub type SharedRegistry = Arc<Mutex<OutputRegistry>>;

struct Entry {
    sink: Box<dyn OutputSink>,
    config: SinkConfig,
    sequence: u64,
    error_forward: Subscription,
}

impl Entry {
    fn record(&self) -> SinkRecord {
        SinkRecord {
            id: self.config.id.clone(),
            kind: self.config.kind.clone(),
            enabled: self.sink.is_enabled(),
            initialized: self.sink.is_initialized(),
            config: self.config.clone(),
            sequence: self.sequence,
        }
    }
}

pub struct OutputRegistry {
    factories: HashMap<String, SinkFactory>,
    /// Creation order
    sinks: Vec<Entry>,
    active: Option<String>,
    next_sequence: u64,
    errors: ListenerSet<SinkErrorEvent>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            sinks: Vec::new(),
            active: None,
            next_sequence: 0,
            errors: ListenerSet::new(),
        }
    }

    /// Registry with the "click" and "sample" audio sinks on cpal.
    /// An optional `device` string option selects the output device.
    pub fn with_default_factories(clock: SharedClock) -> Self {
        let mut registry = Self::new();
        for source in [SoundSourceKind::Click, SoundSourceKind::Sample] {
            let clock = Arc::clone(&clock);
            registry.register_factory(
                source.tag(),
                Box::new(move |config: &SinkConfig| {
                    let device = config
                        .options
                        .get("device")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let sink = AudioSink::new(
                        config.id.clone(),
                        source,
                        Arc::clone(&clock),
                        Box::new(CpalBackend::new(device)),
                    );
                    Ok(Box::new(sink) as Box<dyn OutputSink>)
                }),
            );
        }
        registry
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Register (or replace) the factory for a sink type tag
    pub fn register_factory(&mut self, kind: impl Into<String>, factory: SinkFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn has_factory(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Construct, initialize and store a sink.
    ///
    /// The sink starts disabled unless `config.enabled` is set.
    pub fn create_source(&mut self, config: SinkConfig) -> OutputResult<SinkRecord> {
        if self.contains(&config.id) {
            return Err(OutputError::DuplicateSink(config.id));
        }
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| OutputError::UnknownSinkType(config.kind.clone()))?;

        let mut sink = factory(&config)?;
        sink.initialize(&config)?;
        sink.set_enabled(config.enabled);

        let errors = self.errors.clone();
        let sink_id = config.id.clone();
        let error_forward = sink.on_error(Box::new(move |error: &OutputError| {
            errors.emit(&SinkErrorEvent {
                sink_id: sink_id.clone(),
                message: error.to_string(),
            });
        }));

        let entry = Entry {
            sink,
            config,
            sequence: self.next_sequence,
            error_forward,
        };
        self.next_sequence += 1;

        let record = entry.record();
        log::info!("created sink '{}' ({})", record.id, record.kind);
        self.sinks.push(entry);
        Ok(record)
    }

    /// Enable `id`, mark it active and disable every other sink
    pub fn set_active_source(&mut self, id: &str) -> OutputResult<()> {
        if !self.contains(id) {
            return Err(OutputError::SinkNotFound(id.to_string()));
        }

        for entry in self.sinks.iter_mut() {
            if entry.config.id == id {
                entry.sink.set_enabled(true);
            }
        }
        if self.active.as_deref() != Some(id) {
            log::info!("active sink is now '{}'", id);
        }
        self.active = Some(id.to_string());
        for entry in self.sinks.iter_mut() {
            if entry.config.id != id {
                entry.sink.set_enabled(false);
            }
        }
        Ok(())
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_source(&self) -> Option<&dyn OutputSink> {
        let id = self.active.as_deref()?;
        self.entry(id).map(|entry| entry.sink.as_ref())
    }

    /// Most recently created sink
    pub fn fallback_id(&self) -> Option<&str> {
        self.sinks.last().map(|entry| entry.config.id.as_str())
    }

    /// Sink that `dispatch_tick` would deliver to
    pub fn dispatch_target(&self) -> Option<&str> {
        self.active_id().or_else(|| self.fallback_id())
    }

    /// Deliver a tick to the active sink, or the fallback sink.
    /// Returns `Ok(false)` when no sink exists and the tick was dropped.
    pub fn dispatch_tick(&mut self, event: &TickEvent) -> OutputResult<bool> {
        let Some(target) = self.dispatch_target().map(str::to_string) else {
            log::debug!(
                "no sink for tick {:.2} of measure {}; dropped",
                event.beat_number,
                event.measure_number
            );
            return Ok(false);
        };

        match self.entry_mut(&target) {
            Some(entry) => {
                entry.sink.process_tick(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deliver a tick to every enabled sink
    pub fn process_tick(&mut self, event: &TickEvent) -> OutputResult<()> {
        self.broadcast(true, |sink| sink.process_tick(event))
    }

    pub fn prepare_next_tick(&mut self, next_time: f64) -> OutputResult<()> {
        self.broadcast(true, |sink| sink.prepare_next_tick(next_time))
    }

    pub fn reset(&mut self) -> OutputResult<()> {
        self.broadcast(true, |sink| sink.reset())
    }

    /// Push a config copy to every registered sink, enabled or not
    pub fn update_config(&mut self, config: &MetronomeConfig) -> OutputResult<()> {
        self.broadcast(false, |sink| sink.update_config(config))
    }

    /// Dispose and remove a sink
    pub fn remove_source(&mut self, id: &str) -> OutputResult<()> {
        let index = self
            .sinks
            .iter()
            .position(|entry| entry.config.id == id)
            .ok_or_else(|| OutputError::SinkNotFound(id.to_string()))?;

        self.sinks[index].sink.dispose();
        let entry = self.sinks.remove(index);
        entry.error_forward.unsubscribe();

        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        log::info!("removed sink '{}'", id);
        Ok(())
    }

    /// Dispose and remove every sink. Factories stay registered.
    pub fn dispose(&mut self) {
        for mut entry in self.sinks.drain(..) {
            entry.sink.dispose();
            entry.error_forward.unsubscribe();
        }
        self.active = None;
    }

    /// Registry-level error channel fed by every sink's error listeners.
    /// Callbacks run on whichever thread the sink reported from, which may
    /// be holding this registry's lock.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SinkErrorEvent) + Send + Sync + 'static,
    {
        self.errors.subscribe(callback)
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.sinks.iter().map(Entry::record).collect()
    }

    pub fn get(&self, id: &str) -> Option<SinkRecord> {
        self.entry(id).map(Entry::record)
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.entry(id).map(|entry| entry.sink.is_enabled())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entry(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.sinks.iter().find(|entry| entry.config.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.sinks.iter_mut().find(|entry| entry.config.id == id)
    }

    /// Run `op` on every (enabled) sink. All sinks run even after a failure;
    /// the first error is returned.
    fn broadcast<F>(&mut self, enabled_only: bool, mut op: F) -> OutputResult<()>
    where
        F: FnMut(&mut dyn OutputSink) -> OutputResult<()>,
    {
        let mut first_error = None;
        for entry in self.sinks.iter_mut() {
            if enabled_only && !entry.sink.is_enabled() {
                continue;
            }
            if let Err(e) = op(entry.sink.as_mut()) {
                log::warn!("sink '{}' failed: {}", entry.config.id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
