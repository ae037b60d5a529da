//! device_sensor.rs
//! Sensor backed by real BLE hardware.
//!
//! connect: scan → pick a candidate (directly or via the pending selection) →
//! open + GATT connect → build the device for its profile → hand it to the core.
//! Every await is followed by a generation check so an overtaken attempt backs
//! out without touching state.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use log::{debug, info, warn};

use crate::devices::{
    gatt::{BluetoothPlatform, Peripheral},
    gdx::{GdxDevice, GdxSdk},
    profiles::{filters_for, match_profile, DeviceProfile},
    Device, GattDevice,
};
use crate::error::SensorError;
use crate::sensor::{
    core::SensorCore,
    types::{BleFilter, CapabilitySet, ConnectOptions, DiscoveredDevice, DEFAULT_POLL_INTERVAL},
    Sensor,
};

/// How a discovered peripheral will be driven.
enum Driver {
    Gatt(&'static DeviceProfile),
    Gdx(Arc<dyn GdxSdk>),
}

pub struct DeviceSensor {
    core: Arc<SensorCore>,
    platform: Arc<dyn BluetoothPlatform>,
    gdx: Option<Arc<dyn GdxSdk>>,
}

impl DeviceSensor {
    pub fn new(
        capabilities: CapabilitySet,
        filters: Option<Vec<BleFilter>>,
        platform: Arc<dyn BluetoothPlatform>,
    ) -> Self {
        Self::with_poll_interval(capabilities, filters, platform, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        capabilities: CapabilitySet,
        filters: Option<Vec<BleFilter>>,
        platform: Arc<dyn BluetoothPlatform>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            core: Arc::new(SensorCore::new(capabilities, filters, poll_interval)),
            platform,
            gdx: None,
        }
    }

    /// Enables GDX devices through the given vendor SDK.
    pub fn with_gdx(mut self, sdk: Arc<dyn GdxSdk>) -> Self {
        self.gdx = Some(sdk);
        self
    }

    fn scan_filters(&self, options: &ConnectOptions) -> Vec<BleFilter> {
        if let Some(filters) = &options.filters {
            return filters.clone();
        }
        if let Some(filters) = self.core.filters() {
            return filters.to_vec();
        }
        let mut filters = filters_for(self.core.capabilities());
        if self.gdx.is_some() {
            filters.extend(GdxDevice::filters());
        }
        filters
    }

    fn driver_for(&self, device: &DiscoveredDevice) -> Option<Driver> {
        if let Some(profile) = match_profile(device, self.core.capabilities()) {
            return Some(Driver::Gatt(profile));
        }
        match (&self.gdx, device.name.as_deref()) {
            (Some(sdk), Some(name)) if GdxDevice::matches_name(name) => {
                Some(Driver::Gdx(sdk.clone()))
            }
            _ => None,
        }
    }

    async fn choose(
        &self,
        generation: u64,
        options: &ConnectOptions,
    ) -> Result<DiscoveredDevice, SensorError> {
        let filters = self.scan_filters(options);
        let found = self.platform.scan(&filters).await?;
        self.core.ensure_current(generation)?;

        let mut candidates: Vec<DiscoveredDevice> = found
            .into_iter()
            .filter(|d| self.driver_for(d).is_some())
            .collect();
        debug!("{} compatible devices found", candidates.len());

        let chosen = match candidates.len() {
            0 => return Err(SensorError::NoCompatibleDevice),
            1 if !options.always_show_picker => candidates.swap_remove(0),
            _ => self.core.discovery().await_selection(candidates).await?,
        };
        self.core.ensure_current(generation)?;
        Ok(chosen)
    }

    async fn bind(&self, generation: u64, options: ConnectOptions) -> Result<(), SensorError> {
        let chosen = self.choose(generation, &options).await?;
        let driver = self
            .driver_for(&chosen)
            .ok_or(SensorError::NoCompatibleDevice)?;

        info!("connecting to {}", chosen.display_name());
        let peripheral = self.platform.open(&chosen.id).await?;
        self.core.ensure_current(generation)?;
        peripheral.connect().await?;
        if let Err(e) = self.core.ensure_current(generation) {
            drop_link(peripheral.as_ref()).await;
            return Err(e);
        }

        let device = match self.build(driver, peripheral.clone()).await {
            Ok(device) => device,
            Err(e) => {
                drop_link(peripheral.as_ref()).await;
                return Err(e);
            }
        };
        self.core.establish(generation, device).await
    }

    async fn build(
        &self,
        driver: Driver,
        peripheral: Arc<dyn Peripheral>,
    ) -> Result<Box<dyn Device>, SensorError> {
        let requested = self.core.capabilities().clone();
        match driver {
            Driver::Gatt(profile) => {
                let requested = requested.intersection(&profile.capabilities());
                if requested.is_empty() {
                    return Err(SensorError::NoCompatibleDevice);
                }
                Ok(Box::new(GattDevice::new(profile, peripheral, requested)))
            }
            Driver::Gdx(sdk) => {
                let device =
                    GdxDevice::open(sdk.as_ref(), peripheral, requested, self.core.poll_interval())
                        .await?;
                Ok(Box::new(device))
            }
        }
    }
}

/// Disconnects a peripheral that never got bound to a device.
async fn drop_link(peripheral: &dyn Peripheral) {
    if let Err(e) = peripheral.disconnect().await {
        warn!("[{}] disconnect failed: {}", peripheral.id(), e);
    }
}

#[async_trait]
impl Sensor for DeviceSensor {
    fn core(&self) -> &Arc<SensorCore> {
        &self.core
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), SensorError> {
        let generation = self.core.restart_connect().await;
        let result = self.bind(generation, options).await;
        self.core.finish_connect(generation, result)
    }
}
