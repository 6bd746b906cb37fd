use crate::tags::structures::TagConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS: u64 = 5 * 60 * 1000;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_future_tolerance() -> u64 {
    DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS
}

fn default_evaluation_interval() -> u64 {
    60_000
}

fn default_dynamic_time_deadband() -> u64 {
    1_000
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterSettings {
    /// How far a source timestamp may lie ahead of local time before it is rejected.
    #[serde(default = "default_future_tolerance")]
    pub future_timestamp_tolerance_ms: u64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            future_timestamp_tolerance_ms: default_future_tolerance(),
        }
    }
}

/// Updates per evaluation window that promote / demote a tag of one priority class.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RateThresholds {
    pub activation_threshold: u32,
    pub deactivation_threshold: u32,
}

impl RateThresholds {
    pub fn new(activation_threshold: u32, deactivation_threshold: u32) -> Self {
        RateThresholds {
            activation_threshold,
            deactivation_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DynamicSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_ms: u64,
    /// Interval applied to a promoted tag.
    #[serde(default = "default_dynamic_time_deadband")]
    pub time_deadband_ms: u64,
    #[serde(default = "default_low_thresholds")]
    pub low: RateThresholds,
    #[serde(default = "default_medium_thresholds")]
    pub medium: RateThresholds,
}

fn default_low_thresholds() -> RateThresholds {
    RateThresholds::new(60, 30)
}

fn default_medium_thresholds() -> RateThresholds {
    RateThresholds::new(120, 60)
}

impl Default for DynamicSettings {
    fn default() -> Self {
        DynamicSettings {
            enabled: false,
            evaluation_interval_ms: default_evaluation_interval(),
            time_deadband_ms: default_dynamic_time_deadband(),
            low: default_low_thresholds(),
            medium: default_medium_thresholds(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)] // Clone needed for passing around
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub dynamic: DynamicSettings,
    #[serde(default)] // Make tags optional in the config file
    pub tags: Vec<TagConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: default_log_level(),
            filter: FilterSettings::default(),
            dynamic: DynamicSettings::default(),
            tags: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from a TOML file. `DAQ__`-prefixed environment variables override file values,
    /// e.g. `DAQ__DYNAMIC__ENABLED=true`.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default(
                "filter.future_timestamp_tolerance_ms",
                DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS as i64,
            )?
            .add_source(File::from(config_path))
            .add_source(
                Environment::with_prefix("DAQ")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Deserialize the entire configuration
        s.try_deserialize()
    }

    pub fn save(&self, config_path: &Path) -> io::Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(config_path, toml_string)
    }
}
