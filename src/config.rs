//! config.rs
//! Experiment sensor configuration and application settings.
//!
//! `SensorConfig` is the slice of an experiment JSON the sensor layer consumes:
//! `sensorFields` (capability keys mixed with other field names) and optional
//! scan `filters`. `AppConfig` wraps it with the runtime knobs of the binaries.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use log::info;

use crate::error::ConfigError;
use crate::sensor::types::{BleFilter, CapabilitySet};

/// Environment variable naming a config file when no CLI argument is given.
pub const CONFIG_ENV_VAR: &str = "FIELD_SENSORS_CONFIG";

pub const DEFAULT_STATIC_PROBABILITY: f64 = 0.3;
pub const DEFAULT_REVERSAL_PROBABILITY: f64 = 0.2;
pub const DEFAULT_DEVICE_PICKER_COUNT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    #[serde(default)]
    pub sensor_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<BleFilter>>,
}

impl SensorConfig {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            sensor_fields: fields.into_iter().map(Into::into).collect(),
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: Vec<BleFilter>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from_fields(&self.sensor_fields)
    }

    /// Registry key: canonical JSON of the capability set and filters.
    ///
    /// Field order and non-sensor fields do not change the signature.
    pub fn signature(&self) -> String {
        json!({
            "capabilities": self.capabilities(),
            "filters": self.filters,
        })
        .to_string()
    }
}

/// Mock sensor knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockConfig {
    pub enabled: bool,
    pub auto_connect: bool,
    pub show_device_picker: bool,
    pub device_picker_count: usize,
    pub static_probability: f64,
    pub reversal_probability: f64,
    /// Fixed seed for reproducible runs; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_connect: false,
            show_device_picker: false,
            device_picker_count: DEFAULT_DEVICE_PICKER_COUNT,
            static_probability: DEFAULT_STATIC_PROBABILITY,
            reversal_probability: DEFAULT_REVERSAL_PROBABILITY,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub sensor: SensorConfig,
    pub mock: MockConfig,
    pub poll_interval_ms: u64,
    pub time_series_period_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sensor: SensorConfig::new(["temperature", "humidity", "illuminance"]),
            mock: MockConfig::default(),
            poll_interval_ms: 1_000,
            time_series_period_ms: 100,
            output_dir: PathBuf::from("data/time_series"),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&text)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// First CLI argument, then `FIELD_SENSORS_CONFIG`, then defaults.
    pub fn from_env_or_args() -> Result<Self, ConfigError> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok());
        match path {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn time_series_period(&self) -> Duration {
        Duration::from_millis(self.time_series_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_field_order_and_extras() {
        let a = SensorConfig::new(["humidity", "temperature"]);
        let b = SensorConfig::new(["temperature", "notes", "humidity"]);
        assert_eq!(a.signature(), b.signature());

        let filtered = a.clone().with_filters(vec![BleFilter::with_name_prefix("GDX")]);
        assert_ne!(a.signature(), filtered.signature());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{
            "sensor": { "sensorFields": ["illuminance"], "filters": [{ "namePrefix": "CC2650" }] },
            "mock": { "seed": 7 },
            "pollIntervalMs": 250
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.mock.seed, Some(7));
        assert_eq!(config.mock.device_picker_count, DEFAULT_DEVICE_PICKER_COUNT);
        assert_eq!(config.sensor.capabilities().len(), 1);
        assert_eq!(config.time_series_period_ms, 100);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = AppConfig::load(Path::new("/nonexistent/field_sensors.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/field_sensors.json"));
    }
}
