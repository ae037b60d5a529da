//! error.rs
//! Error types shared by the sensor layer.
//!
//! - `GattError`: failures reported by the Bluetooth platform (scan, connect, characteristic I/O).
//! - `DecodeError`: malformed characteristic payloads.
//! - `SensorError`: everything a `Sensor` or `Device` operation can reject with.
//!
//! All three are `Clone` because the first error after a connect is latched in the
//! sensor status and re-delivered inside `SensorEvent::Error`.

use thiserror::Error;
use uuid::Uuid;

use crate::sensor::types::Capability;

/// Bluetooth platform failures (external collaborator boundary).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GattError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("GATT connect failed: {0}")]
    ConnectFailed(String),

    #[error("Service {0} not found on peripheral")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("Peripheral disconnected")]
    Disconnected,

    #[error("GATT I/O error: {0}")]
    Io(String),
}

/// Characteristic payload could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Scan finished without any peripheral a known profile can drive.
    #[error("No compatible sensor found nearby")]
    NoCompatibleDevice,

    /// The pending device selection was cancelled (by the user or a newer connect).
    #[error("Device selection cancelled")]
    SelectionCancelled,

    #[error("Unknown device id in selection: {0}")]
    UnknownDevice(String),

    /// A newer connect or a disconnect overtook this connect attempt.
    #[error("Connect attempt superseded by a newer request")]
    Superseded,

    #[error("Sensor is not connected")]
    NotConnected,

    #[error("Setup failed for {capability}: {reason}")]
    Setup { capability: Capability, reason: String },

    #[error("No characteristic configured for capability {0}")]
    CapabilityNotConfigured(Capability),

    #[error("Device read channels are not set up")]
    NotSetUp,

    #[error("Time series capture is not supported by this device")]
    TimeSeriesUnsupported,

    #[error("Unknown sub-sensor id: {0}")]
    UnknownSubSensor(String),

    #[error("Vendor SDK error: {0}")]
    Sdk(String),

    #[error(transparent)]
    Gatt(#[from] GattError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Configuration file could not be read or parsed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
