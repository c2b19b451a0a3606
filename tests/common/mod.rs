//! Shared test helpers: a spy sink that records what the registry sends it

#![allow(dead_code)]

use metronome_engine::messaging::Subscription;
use metronome_engine::output::sink::{ErrorHandler, SinkCore, StateHandler};
use metronome_engine::output::{OutputError, OutputResult};
use metronome_engine::{MetronomeConfig, OutputRegistry, OutputSink, SinkConfig, TickEvent};
use std::sync::{Arc, Mutex};

/// Everything a spy sink observed
#[derive(Debug, Default)]
pub struct SpyLog {
    pub ticks: Vec<TickEvent>,
    pub configs: Vec<MetronomeConfig>,
    pub prepared: Vec<f64>,
    pub resets: usize,
    pub disposed: usize,
}

pub type SharedLog = Arc<Mutex<SpyLog>>;

pub struct SpySink {
    core: SinkCore,
    log: SharedLog,
    fail_ticks: bool,
}

impl OutputSink for SpySink {
    fn id(&self) -> &str {
        self.core.id()
    }

    fn kind(&self) -> &str {
        self.core.kind()
    }

    fn initialize(&mut self, _config: &SinkConfig) -> OutputResult<()> {
        self.core.ensure_uninitialized()?;
        self.core.set_initialized(true);
        Ok(())
    }

    fn dispose(&mut self) {
        self.log.lock().unwrap().disposed += 1;
        self.core.set_initialized(false);
    }

    fn process_tick(&mut self, event: &TickEvent) -> OutputResult<()> {
        if !self.core.is_active() {
            return Ok(());
        }
        if self.fail_ticks {
            let error = OutputError::Device(format!("{} refused tick", self.core.id()));
            self.core.report(&error);
            return Err(error);
        }
        self.log.lock().unwrap().ticks.push(event.clone());
        Ok(())
    }

    fn update_config(&mut self, config: &MetronomeConfig) -> OutputResult<()> {
        self.log.lock().unwrap().configs.push(config.clone());
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.core.set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    fn prepare_next_tick(&mut self, next_time: f64) -> OutputResult<()> {
        self.log.lock().unwrap().prepared.push(next_time);
        Ok(())
    }

    fn reset(&mut self) -> OutputResult<()> {
        self.log.lock().unwrap().resets += 1;
        Ok(())
    }

    fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.core.on_error(handler)
    }

    fn on_state_change(&self, handler: StateHandler) -> Subscription {
        self.core.on_state_change(handler)
    }
}

/// Register a "spy" factory (and a "failing" one) whose sinks share one log
/// per sink id
pub fn register_spies(registry: &mut OutputRegistry) -> Arc<Mutex<Vec<(String, SharedLog)>>> {
    let logs: Arc<Mutex<Vec<(String, SharedLog)>>> = Arc::new(Mutex::new(Vec::new()));

    for (kind, fail_ticks) in [("spy", false), ("failing", true)] {
        let logs = Arc::clone(&logs);
        registry.register_factory(
            kind,
            Box::new(move |config: &SinkConfig| {
                let log = SharedLog::default();
                logs.lock().unwrap().push((config.id.clone(), Arc::clone(&log)));
                Ok(Box::new(SpySink {
                    core: SinkCore::new(config.id.clone(), config.kind.clone()),
                    log,
                    fail_ticks,
                }) as Box<dyn OutputSink>)
            }),
        );
    }

    logs
}

/// Log of the sink created with `id`
pub fn log_of(logs: &Arc<Mutex<Vec<(String, SharedLog)>>>, id: &str) -> SharedLog {
    logs.lock()
        .unwrap()
        .iter()
        .find(|(sink_id, _)| sink_id == id)
        .map(|(_, log)| Arc::clone(log))
        .unwrap()
}
