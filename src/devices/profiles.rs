//! profiles.rs
//! Protocol tables for the supported TI SensorTag generations.
//!
//! A profile maps each capability to the GATT service, data characteristic,
//! optional config characteristic and decoder for one chip. The generic
//! `GattDevice` reads these tables; there is no per-vendor device type.

use std::cmp::Reverse;
use uuid::Uuid;

use crate::devices::decoders::{self, Decoder};
use crate::sensor::types::{BleFilter, Capability, CapabilitySet, DiscoveredDevice};

/// Byte written to a config characteristic to power a sensor on.
pub const ENABLE_SENSOR: &[u8] = &[0x01];
/// Byte written to a config characteristic to power a sensor off.
pub const DISABLE_SENSOR: &[u8] = &[0x00];

/// TI SensorTag UUIDs all live in `F000xxxx-0451-4000-B000-000000000000`.
const fn ti_uuid(short: u16) -> Uuid {
    Uuid::from_u128(0xf0000000_0451_4000_b000_000000000000 | ((short as u128) << 96))
}

const IR_TEMPERATURE_SERVICE: Uuid = ti_uuid(0xaa00);
const IR_TEMPERATURE_DATA: Uuid = ti_uuid(0xaa01);
const IR_TEMPERATURE_CONFIG: Uuid = ti_uuid(0xaa02);

const HUMIDITY_SERVICE: Uuid = ti_uuid(0xaa20);
const HUMIDITY_DATA: Uuid = ti_uuid(0xaa21);
const HUMIDITY_CONFIG: Uuid = ti_uuid(0xaa22);

const OPTICAL_SERVICE: Uuid = ti_uuid(0xaa70);
const OPTICAL_DATA: Uuid = ti_uuid(0xaa71);
const OPTICAL_CONFIG: Uuid = ti_uuid(0xaa72);

/// How to reach and decode one capability on a device.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec {
    pub capability: Capability,
    pub service: Uuid,
    pub data: Uuid,
    pub config: Option<Uuid>,
    pub decode: Decoder,
}

#[derive(Debug)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub name_prefixes: &'static [&'static str],
    pub channels: &'static [ChannelSpec],
}

impl DeviceProfile {
    pub fn capabilities(&self) -> CapabilitySet {
        self.channels.iter().map(|c| c.capability).collect()
    }

    pub fn channel(&self, capability: Capability) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.capability == capability)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name_prefixes.iter().any(|p| name.starts_with(p))
    }

    pub fn services(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.channels.iter().map(|c| c.service)
    }

    /// Scan filters narrowing discovery to this profile.
    pub fn filters(&self) -> Vec<BleFilter> {
        self.name_prefixes
            .iter()
            .map(|p| BleFilter::with_name_prefix(p))
            .collect()
    }
}

pub static CC2650: DeviceProfile = DeviceProfile {
    name: "CC2650 SensorTag",
    name_prefixes: &["CC2650 SensorTag", "SensorTag 2.0"],
    channels: &[
        ChannelSpec {
            capability: Capability::Temperature,
            service: IR_TEMPERATURE_SERVICE,
            data: IR_TEMPERATURE_DATA,
            config: Some(IR_TEMPERATURE_CONFIG),
            decode: decoders::tmp007_ambient_celsius,
        },
        ChannelSpec {
            capability: Capability::Humidity,
            service: HUMIDITY_SERVICE,
            data: HUMIDITY_DATA,
            config: Some(HUMIDITY_CONFIG),
            decode: decoders::hdc1000_humidity,
        },
        ChannelSpec {
            capability: Capability::Illuminance,
            service: OPTICAL_SERVICE,
            data: OPTICAL_DATA,
            config: Some(OPTICAL_CONFIG),
            decode: decoders::opt3001_lux,
        },
    ],
};

/// CC1350 has no IR thermopile; temperature comes from the HDC1080.
pub static CC1350: DeviceProfile = DeviceProfile {
    name: "CC1350 SensorTag",
    name_prefixes: &["CC1350 SensorTag"],
    channels: &[
        ChannelSpec {
            capability: Capability::Temperature,
            service: HUMIDITY_SERVICE,
            data: HUMIDITY_DATA,
            config: Some(HUMIDITY_CONFIG),
            decode: decoders::hdc1000_celsius,
        },
        ChannelSpec {
            capability: Capability::Humidity,
            service: HUMIDITY_SERVICE,
            data: HUMIDITY_DATA,
            config: Some(HUMIDITY_CONFIG),
            decode: decoders::hdc1000_humidity,
        },
        ChannelSpec {
            capability: Capability::Illuminance,
            service: OPTICAL_SERVICE,
            data: OPTICAL_DATA,
            config: Some(OPTICAL_CONFIG),
            decode: decoders::opt3001_lux,
        },
    ],
};

pub static CC2541: DeviceProfile = DeviceProfile {
    name: "CC2541 SensorTag",
    name_prefixes: &["TI BLE Sensor Tag", "SensorTag"],
    channels: &[
        ChannelSpec {
            capability: Capability::Temperature,
            service: IR_TEMPERATURE_SERVICE,
            data: IR_TEMPERATURE_DATA,
            config: Some(IR_TEMPERATURE_CONFIG),
            decode: decoders::tmp006_ambient_celsius,
        },
        ChannelSpec {
            capability: Capability::Humidity,
            service: HUMIDITY_SERVICE,
            data: HUMIDITY_DATA,
            config: Some(HUMIDITY_CONFIG),
            decode: decoders::sht21_humidity,
        },
    ],
};

/// Match order matters: "SensorTag" would also catch "SensorTag 2.0".
pub static PROFILES: [&DeviceProfile; 3] = [&CC2650, &CC1350, &CC2541];

/// Picks the profile that should drive `device`.
///
/// Name prefixes win; otherwise the profile sharing an advertised service and
/// covering the most requested capabilities is chosen. Either way the profile
/// must report at least one requested capability.
pub fn match_profile(
    device: &DiscoveredDevice,
    requested: &CapabilitySet,
) -> Option<&'static DeviceProfile> {
    if let Some(name) = device.name.as_deref() {
        if let Some(profile) = PROFILES.iter().find(|p| p.matches_name(name)) {
            let useful = !profile.capabilities().intersection(requested).is_empty();
            return useful.then_some(*profile);
        }
    }

    PROFILES
        .iter()
        .filter(|p| p.services().any(|s| device.services.contains(&s)))
        .map(|p| (*p, p.capabilities().intersection(requested).len()))
        .filter(|(_, overlap)| *overlap > 0)
        // first profile wins ties
        .min_by_key(|(_, overlap)| Reverse(*overlap))
        .map(|(p, _)| p)
}

/// Name-prefix filters for every profile able to report at least one requested capability.
pub fn filters_for(requested: &CapabilitySet) -> Vec<BleFilter> {
    PROFILES
        .iter()
        .filter(|p| !p.capabilities().intersection(requested).is_empty())
        .flat_map(|p| p.filters())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            id: name.to_lowercase(),
            name: Some(name.to_string()),
            rssi: Some(-60),
            services: vec![],
        }
    }

    fn all() -> CapabilitySet {
        Capability::ALL.into_iter().collect()
    }

    #[test]
    fn ti_uuids_expand_correctly() {
        assert_eq!(
            OPTICAL_SERVICE.to_string(),
            "f000aa70-0451-4000-b000-000000000000"
        );
    }

    #[test]
    fn name_prefix_picks_first_profile_in_table_order() {
        assert_eq!(match_profile(&named("SensorTag 2.0"), &all()).unwrap().name, CC2650.name);
        assert_eq!(match_profile(&named("CC1350 SensorTag"), &all()).unwrap().name, CC1350.name);
        assert_eq!(match_profile(&named("SensorTag"), &all()).unwrap().name, CC2541.name);
        assert!(match_profile(&named("Polar H10"), &all()).is_none());
    }

    #[test]
    fn name_match_without_requested_capability_is_rejected() {
        // CC2541 has no light sensor, and its name must not fall through to another profile
        let light: CapabilitySet = [Capability::Illuminance].into_iter().collect();
        assert!(match_profile(&named("SensorTag"), &light).is_none());
        assert_eq!(match_profile(&named("SensorTag 2.0"), &light).unwrap().name, CC2650.name);
    }

    #[test]
    fn unnamed_device_falls_back_to_capability_overlap() {
        let device = DiscoveredDevice {
            id: "x".into(),
            name: None,
            rssi: None,
            services: vec![OPTICAL_SERVICE, HUMIDITY_SERVICE],
        };
        let light: CapabilitySet = [Capability::Illuminance].into_iter().collect();
        assert_eq!(match_profile(&device, &light).unwrap().name, CC2650.name);

        let nothing_useful = CapabilitySet::new();
        assert!(match_profile(&device, &nothing_useful).is_none());
    }

    #[test]
    fn filters_skip_profiles_without_requested_capability() {
        let light: CapabilitySet = [Capability::Illuminance].into_iter().collect();
        let filters = filters_for(&light);
        assert!(filters.iter().all(|f| f.name_prefix.as_deref() != Some("SensorTag")));
        assert_eq!(filters.len(), 3);
    }
}
