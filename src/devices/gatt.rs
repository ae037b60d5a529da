//! gatt.rs
//! Bluetooth platform boundary: scanning and GATT characteristic I/O.
//!
//! The host application provides an implementation (btleplug, Web Bluetooth bridge,
//! Cordova plugin...). Everything above this module only sees these traits.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::GattError;
use crate::sensor::types::{BleFilter, DiscoveredDevice};

/// One connected (or connectable) peripheral.
#[async_trait]
pub trait Peripheral: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> Option<&str>;

    async fn connect(&self) -> Result<(), GattError>;

    async fn disconnect(&self) -> Result<(), GattError>;

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, GattError>;

    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), GattError>;
}

/// Platform "find nearby devices" entry point.
#[async_trait]
pub trait BluetoothPlatform: Send + Sync {
    /// Scans for peripherals matching any of `filters` (all, when empty).
    async fn scan(&self, filters: &[BleFilter]) -> Result<Vec<DiscoveredDevice>, GattError>;

    /// Opens a handle to a previously discovered peripheral.
    async fn open(&self, id: &str) -> Result<Arc<dyn Peripheral>, GattError>;
}
