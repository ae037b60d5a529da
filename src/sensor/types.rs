//! types.rs
//! Value types shared by devices, sensors and the registry.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    time::Duration,
};
use uuid::Uuid;

use crate::error::SensorError;

/// Physical quantity a sensor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Illuminance,
    Temperature,
    Humidity,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Illuminance,
        Capability::Temperature,
        Capability::Humidity,
    ];

    /// Key used by experiment `sensorFields`.
    pub fn key(&self) -> &'static str {
        match self {
            Capability::Illuminance => "illuminance",
            Capability::Temperature => "temperature",
            Capability::Humidity => "humidity",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Illuminance => "Illuminance",
            Capability::Temperature => "Temperature",
            Capability::Humidity => "Humidity",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            Capability::Illuminance => "lux",
            Capability::Temperature => "°C",
            Capability::Humidity => "%",
        }
    }

    /// Mock generator defaults: (min, max).
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            Capability::Illuminance => (0.0, 10_000.0),
            Capability::Temperature => (0.0, 40.0),
            Capability::Humidity => (0.0, 100.0),
        }
    }

    /// Mock generator default step bound.
    pub fn default_increment(&self) -> f64 {
        match self {
            Capability::Illuminance => 50.0,
            Capability::Temperature => 0.5,
            Capability::Humidity => 1.0,
        }
    }

    pub fn measurement_info(&self) -> MeasurementInfo {
        let (min, max) = self.default_range();
        MeasurementInfo {
            name: self.name().to_string(),
            units: self.units().to_string(),
            min,
            max,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from experiment `sensorFields`; unknown keys are skipped.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut set = Self::new();
        for field in fields {
            match Capability::from_key(field.as_ref()) {
                Some(cap) => {
                    set.insert(cap);
                }
                None => log::debug!("ignoring non-sensor field '{}'", field.as_ref()),
            }
        }
        set
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn intersection(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet(self.0.intersection(&other.0).copied().collect())
    }

    /// Values map with every capability present but absent.
    pub fn empty_values(&self) -> SensorValues {
        self.iter().map(|c| (c, None)).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        CapabilitySet(iter.into_iter().collect())
    }
}

/// Last known reading per capability; `None` means absent.
pub type SensorValues = BTreeMap<Capability, Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Metadata describing one measurement channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInfo {
    pub name: String,
    pub units: String,
    pub min: f64,
    pub max: f64,
}

/// One independent channel of a multi-sensor device, chosen by an opaque id.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectableSensor {
    pub id: String,
    pub info: MeasurementInfo,
}

/// Peripheral as reported by a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Web-Bluetooth style scan filter; every present criterion must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BleFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl BleFilter {
    pub fn with_name_prefix(prefix: &str) -> Self {
        Self {
            name_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn with_services(services: Vec<Uuid>) -> Self {
        Self {
            services,
            ..Self::default()
        }
    }

    pub fn matches(&self, device: &DiscoveredDevice) -> bool {
        let name = device.name.as_deref();
        if let Some(expected) = &self.name {
            if name != Some(expected.as_str()) {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !name.is_some_and(|n| n.starts_with(prefix.as_str())) {
                return false;
            }
        }
        self.services.iter().all(|s| device.services.contains(s))
    }
}

/// True when any filter in the list matches (an empty list accepts everything).
pub fn matches_any(filters: &[BleFilter], device: &DiscoveredDevice) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(device))
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Overrides the sensor's declared filters for this attempt.
    pub filters: Option<Vec<BleFilter>>,
    /// Park in a pending selection even when only one candidate was found.
    pub always_show_picker: bool,
}

/// Typed events delivered to sensor listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Connecting,
    Connection {
        connected: bool,
        device_name: Option<String>,
    },
    Values {
        device_name: Option<String>,
        values: SensorValues,
    },
    Error {
        device_name: Option<String>,
        error: SensorError,
    },
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: Option<&str>, services: Vec<Uuid>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: "aa:bb".into(),
            name: name.map(str::to_string),
            rssi: None,
            services,
        }
    }

    #[test]
    fn fields_skip_unknown_keys() {
        let set = CapabilitySet::from_fields(&["temperature", "notes", "humidity"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Capability::Temperature));
        assert!(set.contains(Capability::Humidity));
        assert!(!set.contains(Capability::Illuminance));
    }

    #[test]
    fn name_prefix_filter_requires_a_name() {
        let filter = BleFilter::with_name_prefix("CC2650");
        assert!(filter.matches(&device(Some("CC2650 SensorTag"), vec![])));
        assert!(!filter.matches(&device(Some("GDX-TMP 0F1"), vec![])));
        assert!(!filter.matches(&device(None, vec![])));
    }

    #[test]
    fn service_filter_needs_every_service() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let filter = BleFilter::with_services(vec![a, b]);
        assert!(filter.matches(&device(None, vec![b, a])));
        assert!(!filter.matches(&device(None, vec![a])));
        assert!(matches_any(&[], &device(None, vec![])));
    }

    #[test]
    fn filters_deserialize_from_experiment_json() {
        let json = r#"[{"namePrefix":"GDX"},{"services":["f000aa70-0451-4000-b000-000000000000"]}]"#;
        let filters: Vec<BleFilter> = serde_json::from_str(json).unwrap();
        assert_eq!(filters[0].name_prefix.as_deref(), Some("GDX"));
        assert_eq!(
            filters[1].services,
            vec![Uuid::from_u128(0xf000aa70_0451_4000_b000_000000000000)]
        );
    }
}
