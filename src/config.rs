// App configuration - Metronome settings and sink list stored on disk
//
// RON or JSON, chosen by file extension.

use crate::output::SinkConfig;
use crate::sequencer::MetronomeConfig;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Ron,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> ConfigResult<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("ron") => Ok(Format::Ron),
            Some("json") => Ok(Format::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metronome: MetronomeConfig,
    /// Sinks to create at startup, in order
    pub sinks: Vec<SinkConfig>,
    /// Sink made active after creation; the first sink when unset
    pub active_sink: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            metronome: MetronomeConfig::default(),
            sinks: vec![SinkConfig::new("click", "click").with_enabled(true)],
            active_sink: Some("click".to_string()),
        }
    }
}

impl AppConfig {
    /// `<config dir>/metronome/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("metronome").join("config.ron"))
    }

    /// Load and normalize a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: AppConfig = match format {
            Format::Ron => ron::from_str(&content)?,
            Format::Json => serde_json::from_str(&content)?,
        };
        log::debug!("loaded config from {}", path.display());
        Ok(config.normalized())
    }

    /// Load `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write a pretty-printed config, creating parent directories
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = match Format::from_path(path)? {
            Format::Ron => ron::ser::to_string_pretty(self, PrettyConfig::default())?,
            Format::Json => serde_json::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.metronome = self.metronome.normalized();
        self
    }

    /// Config of the sink to activate
    pub fn active_sink_config(&self) -> Option<&SinkConfig> {
        match &self.active_sink {
            Some(id) => self.sinks.iter().find(|sink| &sink.id == id),
            None => self.sinks.first(),
        }
    }
}
