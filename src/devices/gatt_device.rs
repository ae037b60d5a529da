//! gatt_device.rs
//! Generic table-driven device for GATT sensors.
//!
//! Every supported SensorTag generation is a `DeviceProfile`; this type walks
//! the profile's channel table for the requested capabilities. Channels are
//! armed by writing the enable byte to their config characteristic (the chip
//! streams zeros until then) and released by writing the disable byte.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use log::{debug, warn};

use crate::devices::{
    device::Device,
    gatt::Peripheral,
    profiles::{ChannelSpec, DeviceProfile, DISABLE_SENSOR, ENABLE_SENSOR},
};
use crate::error::SensorError;
use crate::sensor::types::{Capability, CapabilitySet, SensorValues};

pub struct GattDevice {
    profile: &'static DeviceProfile,
    peripheral: Arc<dyn Peripheral>,
    name: String,
    requested: CapabilitySet,
    /// Channels armed by `setup_read`; empty before setup and after teardown.
    channels: BTreeMap<Capability, ChannelSpec>,
    is_setup: bool,
}

impl GattDevice {
    pub fn new(
        profile: &'static DeviceProfile,
        peripheral: Arc<dyn Peripheral>,
        requested: CapabilitySet,
    ) -> Self {
        let name = peripheral.name().unwrap_or(profile.name).to_string();
        Self {
            profile,
            peripheral,
            name,
            requested,
            channels: BTreeMap::new(),
            is_setup: false,
        }
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    async fn arm(&self, channel: &ChannelSpec) -> Result<(), SensorError> {
        let armed = match channel.config {
            Some(config) => {
                self.peripheral
                    .write(channel.service, config, ENABLE_SENSOR)
                    .await
            }
            // nothing to enable; prove the characteristic exists
            None => self
                .peripheral
                .read(channel.service, channel.data)
                .await
                .map(|_| ()),
        };

        armed.map_err(|e| SensorError::Setup {
            capability: channel.capability,
            reason: e.to_string(),
        })
    }

    /// Writes the disable byte to every configurable channel; returns the first failure.
    async fn disarm(&self, channels: &BTreeMap<Capability, ChannelSpec>) -> Option<SensorError> {
        let mut first_error = None;
        for channel in channels.values() {
            let Some(config) = channel.config else { continue };
            if let Err(e) = self
                .peripheral
                .write(channel.service, config, DISABLE_SENSOR)
                .await
            {
                warn!("[{}] failed to disable {}: {}", self.name, channel.capability, e);
                first_error.get_or_insert(SensorError::from(e));
            }
        }
        first_error
    }
}

#[async_trait]
impl Device for GattDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.profile.capabilities()
    }

    fn requested_capabilities(&self) -> &CapabilitySet {
        &self.requested
    }

    async fn setup_read(&mut self) -> Result<(), SensorError> {
        let mut armed = BTreeMap::new();
        for capability in self.requested.iter() {
            let Some(channel) = self.profile.channel(capability) else {
                debug!("[{}] no channel for {}, skipping", self.name, capability);
                continue;
            };
            if let Err(e) = self.arm(channel).await {
                // power down what was already switched on
                self.disarm(&armed).await;
                return Err(e);
            }
            armed.insert(capability, *channel);
        }

        self.channels = armed;
        self.is_setup = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<SensorValues, SensorError> {
        let mut values = SensorValues::new();
        for capability in self.requested.iter() {
            let channel = self
                .channels
                .get(&capability)
                .ok_or(SensorError::CapabilityNotConfigured(capability))?;
            let raw = self.peripheral.read(channel.service, channel.data).await?;
            values.insert(capability, Some((channel.decode)(&raw)?));
        }
        Ok(values)
    }

    async fn teardown_read(&mut self) -> Result<(), SensorError> {
        if !self.is_setup {
            return Err(SensorError::NotSetUp);
        }

        let channels = std::mem::take(&mut self.channels);
        self.is_setup = false;

        match self.disarm(&channels).await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("[{}] disconnect failed: {}", self.name, e);
        }
    }
}
