//! Configuration management using Figment.
//!
//! Settings are layered from three sources, later ones winning:
//! 1. Built-in defaults (`Settings::default()`), which describe the standard rig
//! 2. A TOML file (`config/rig.toml` unless another path is given)
//! 3. Environment variables prefixed with `RIG_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use rig_daq::config::Settings;
//!
//! // RIG_DAQ_APPLICATION__LOG_LEVEL=debug overrides the file
//! let settings = Settings::load()?;
//! println!("Application: {}", settings.application.name);
//! # Ok::<(), rig_daq::error::DaqError>(())
//! ```

use crate::channel::registry::ChannelRegistry;
use crate::channel::ChannelId;
use crate::error::{AppResult, DaqError};
use crate::validation::{is_in_range, is_not_empty};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/rig.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "RIG_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Persistence and export locations
    pub storage: StorageConfig,
    /// Sweep protocol settings
    pub acquisition: AcquisitionConfig,
    /// Channel registry
    pub channels: Vec<ChannelDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, coloured (development)
    #[default]
    Pretty,
    /// Single-line, no colours
    Compact,
    /// Structured JSON lines
    Json,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory that receives CSV exports
    pub export_dir: PathBuf,
}

/// Acquisition protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Order in which channels are read during one sweep. Duplicates are allowed.
    pub sweep_order: Vec<ChannelId>,
    /// Consecutive unstable sweeps tolerated before the batch is aborted
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Simulated latency of one read on the mock plant, in milliseconds
    #[serde(default)]
    pub mock_read_delay_ms: u64,
}

/// Class of a configured channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKindTag {
    /// Single reading per sweep
    Base,
    /// Burst of readings reduced to mean and variance
    MultiSample,
    /// Repeated readings that must agree within a sweep
    Stable,
}

/// One channel as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDefinition {
    /// Plant channel identifier
    pub id: ChannelId,
    /// Column name (lowercase identifier)
    pub name: String,
    /// Header shown to the operator, defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Channel class
    pub kind: ChannelKindTag,
    /// Expected `[low, high]` envelope (base channels only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<[f64; 2]>,
    /// Burst size (multi-sample channels only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
}

impl ChannelDefinition {
    fn base(id: ChannelId, name: &str, label: &str, bound: Option<[f64; 2]>) -> Self {
        Self {
            id,
            name: name.to_string(),
            label: Some(label.to_string()),
            kind: ChannelKindTag::Base,
            bound,
            samples: None,
        }
    }

    fn multi_sample(id: ChannelId, name: &str, label: &str, samples: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            label: Some(label.to_string()),
            kind: ChannelKindTag::MultiSample,
            bound: None,
            samples: Some(samples),
        }
    }

    fn stable(id: ChannelId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            label: None,
            kind: ChannelKindTag::Stable,
            bound: None,
            samples: None,
        }
    }
}

fn default_max_consecutive_failures() -> u32 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationConfig {
                name: "Rig DAQ".to_string(),
                log_level: "info".to_string(),
                log_format: LogFormat::Pretty,
            },
            storage: StorageConfig {
                database_path: PathBuf::from("rig_daq.db"),
                export_dir: PathBuf::from("export"),
            },
            acquisition: AcquisitionConfig {
                sweep_order: vec![8, 71, 1, 2, 3, 4, 5, 20, 43, 58, 71, 6, 8, 71],
                max_consecutive_failures: default_max_consecutive_failures(),
                mock_read_delay_ms: 0,
            },
            channels: vec![
                ChannelDefinition::base(1, "temperature", "Temperature", Some([-21.0, 25.0])),
                ChannelDefinition::base(2, "pressure", "Pressure", None),
                ChannelDefinition::base(3, "humidity", "Humidity", Some([50.0, 98.0])),
                ChannelDefinition::base(4, "sensor4", "Sensor 4", Some([0.0, 1.0])),
                ChannelDefinition::base(5, "sensor5", "Sensor 5", None),
                ChannelDefinition::multi_sample(6, "sensor6", "Sensor 6", 7),
                ChannelDefinition::stable(8, "reference8"),
                ChannelDefinition::base(20, "observation20", "Observation 20", None),
                ChannelDefinition::base(43, "observation43", "Observation 43", None),
                ChannelDefinition::base(58, "observation58", "Observation 58", None),
                ChannelDefinition::stable(71, "reference71"),
            ],
        }
    }
}

impl Settings {
    /// Load configuration from `config/rig.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment still apply.
    /// The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        is_not_empty(&self.application.name)
            .map_err(|e| DaqError::Configuration(format!("application.name: {e}")))?;

        is_in_range(self.acquisition.max_consecutive_failures, 1..=u32::MAX).map_err(|_| {
            DaqError::Configuration(
                "acquisition.max_consecutive_failures must be at least 1".to_string(),
            )
        })?;

        // Channel structure, bounds and sweep coverage are checked by the registry itself.
        ChannelRegistry::from_settings(self).map(|_| ())
    }
}
