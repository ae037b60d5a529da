//! # Field Sensors
//! Sensor abstraction and acquisition layer for BLE lab sensors.
//!
//! ## Layers
//! - **devices:** GATT platform boundary, per-vendor decoders, the profile table and
//!   the generic device that walks it; GDX devices through their vendor SDK.
//! - **sensor:** connect/disconnect state machine, fixed-delay poll loop, typed events,
//!   pending device selection, and the application-owned registry.
//! - **mock:** random-walk sensor with the same contract, for demos and tests.
//! - **time_series:** bounded (1000 sample) captures decoupled from polling.
//!
//! ## Concurrency
//! - Tokio tasks for polling and captures; one read in flight per sensor.
//! - `parking_lot` locks for plain state, never held across `.await`.
//! - Connect generations discard work finished by an overtaken attempt.

pub mod config;
pub mod devices;
pub mod error;
pub mod mock;
pub mod sensor;
pub mod time_series;
pub mod utils;

pub use config::{AppConfig, SensorConfig};
pub use error::{ConfigError, DecodeError, GattError, SensorError};
pub use mock::{MockSensor, MockSensorOptions};
pub use sensor::{
    Capability, CapabilitySet, ConnectOptions, DeviceSensor, Sensor, SensorEvent, SensorRegistry,
    SensorValues,
};
pub use time_series::{TimeSeries, TimeSeriesHandle};
