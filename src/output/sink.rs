// Output sink - Capability contract shared by every tick consumer

use crate::messaging::listeners::{ListenerSet, Subscription};
use crate::output::{OutputError, OutputResult};
use crate::sequencer::config::MetronomeConfig;
use crate::sequencer::tick::TickEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ErrorHandler = Box<dyn Fn(&OutputError) + Send + Sync>;
pub type StateHandler = Box<dyn Fn(&SinkState) + Send + Sync>;

/// Core trait that every output sink must implement
pub trait OutputSink: Send {
    /// Unique sink id
    fn id(&self) -> &str;

    /// Type tag the sink was created from ("click", "sample", ...)
    fn kind(&self) -> &str;

    /// Acquire resources. Fails with `AlreadyInitialized` when called twice
    /// without an intervening `dispose`.
    fn initialize(&mut self, config: &SinkConfig) -> OutputResult<()>;

    /// Release resources. The sink may be initialized again afterwards.
    fn dispose(&mut self);

    /// Render one tick. Must be `Ok(())` when disabled or uninitialized.
    fn process_tick(&mut self, event: &TickEvent) -> OutputResult<()>;

    /// Receive a copy of the current metronome configuration
    fn update_config(&mut self, config: &MetronomeConfig) -> OutputResult<()>;

    /// Enable or disable rendering; notifies state listeners on change only
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn is_initialized(&self) -> bool;

    /// Look-ahead hook called with the time of the next main beat
    fn prepare_next_tick(&mut self, _next_time: f64) -> OutputResult<()> {
        Ok(())
    }

    /// Drop any pending state after the scheduler stops
    fn reset(&mut self) -> OutputResult<()> {
        Ok(())
    }

    /// Register an error listener
    fn on_error(&self, handler: ErrorHandler) -> Subscription;

    /// Register a state-change listener
    fn on_state_change(&self, handler: StateHandler) -> Subscription;
}

/// Sink configuration, as stored in the app config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub enabled: bool,
    /// Sink-specific options, parsed by the concrete sink
    #[serde(default)]
    pub options: serde_json::Value,
}

impl SinkConfig {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            enabled: false,
            options: serde_json::Value::Null,
        }
    }

    /// Config with a fresh unique id such as `click-1f0c...`
    pub fn generated(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::new(format!("{}-{}", kind, Uuid::new_v4()), kind)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Parse the options blob; missing options yield `T::default()`
    pub fn parse_options<T>(&self) -> OutputResult<T>
    where
        T: DeserializeOwned + Default,
    {
        if self.options.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.options.clone())?)
    }
}

/// Registry-side view of a registered sink
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub id: String,
    pub kind: String,
    pub enabled: bool,
    pub initialized: bool,
    pub config: SinkConfig,
    /// Creation order; the highest value is the most recent sink
    pub sequence: u64,
}

/// Error reported by a sink, tagged with the sink id
#[derive(Debug, Clone, PartialEq)]
pub struct SinkErrorEvent {
    pub sink_id: String,
    pub message: String,
}

/// Snapshot passed to state-change listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkState {
    pub id: String,
    pub enabled: bool,
    pub initialized: bool,
}

/// Bookkeeping shared by sink implementations: identity, flags and the
/// two listener sets.
pub struct SinkCore {
    id: String,
    kind: String,
    enabled: bool,
    initialized: bool,
    errors: ListenerSet<OutputError>,
    states: ListenerSet<SinkState>,
}

impl SinkCore {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            enabled: false,
            initialized: false,
            errors: ListenerSet::new(),
            states: ListenerSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True when ticks should be rendered
    pub fn is_active(&self) -> bool {
        self.enabled && self.initialized
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.notify_state();
        }
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        if self.initialized != initialized {
            self.initialized = initialized;
            self.notify_state();
        }
    }

    /// Fails when already initialized
    pub fn ensure_uninitialized(&self) -> OutputResult<()> {
        if self.initialized {
            return Err(OutputError::AlreadyInitialized(self.id.clone()));
        }
        Ok(())
    }

    pub fn report(&self, error: &OutputError) {
        self.errors.emit(error);
    }

    /// Handle for reporting errors from another thread (audio callbacks)
    pub fn error_listeners(&self) -> ListenerSet<OutputError> {
        self.errors.clone()
    }

    pub fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.errors.subscribe(handler)
    }

    pub fn on_state_change(&self, handler: StateHandler) -> Subscription {
        self.states.subscribe(handler)
    }

    pub fn state(&self) -> SinkState {
        SinkState {
            id: self.id.clone(),
            enabled: self.enabled,
            initialized: self.initialized,
        }
    }

    fn notify_state(&self) {
        self.states.emit(&self.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Options {
        gain: f32,
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SinkConfig::generated("click");
        let b = SinkConfig::generated("click");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("click-"));
        assert_eq!(a.kind, "click");
        assert!(!a.enabled);
    }

    #[test]
    fn test_parse_options() {
        let config = SinkConfig::new("a", "click");
        assert_eq!(config.parse_options::<Options>().unwrap(), Options::default());

        let config = config.with_options(serde_json::json!({ "gain": 0.5 }));
        assert_eq!(config.parse_options::<Options>().unwrap().gain, 0.5);

        let config = SinkConfig::new("b", "click").with_options(serde_json::json!({ "gain": "loud" }));
        assert!(matches!(
            config.parse_options::<Options>(),
            Err(OutputError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_state_notified_on_change_only() {
        let mut core = SinkCore::new("a", "click");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _subscription = core.on_state_change(Box::new(move |state: &SinkState| {
            seen_clone.lock().unwrap().push(state.enabled);
        }));

        core.set_enabled(true);
        core.set_enabled(true);
        core.set_enabled(false);

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_double_initialize_guard() {
        let mut core = SinkCore::new("a", "click");
        assert!(core.ensure_uninitialized().is_ok());
        core.set_initialized(true);
        assert!(matches!(
            core.ensure_uninitialized(),
            Err(OutputError::AlreadyInitialized(id)) if id == "a"
        ));
    }
}
