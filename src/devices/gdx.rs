//! gdx.rs
//! Vernier Go Direct (GDX) multi-sensor devices driven through the vendor SDK.
//!
//! Unlike SensorTags, a GDX unit streams: the SDK pushes "value changed" events
//! once channels are enabled and `start` is called. Regular polling reads the
//! latest streamed value; time-series capture subscribes to the stream directly.
//! Channels are the device's selectable sub-sensors, identified by channel number.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use log::{debug, info, warn};

use crate::devices::{device::Device, gatt::Peripheral};
use crate::error::SensorError;
use crate::sensor::types::{
    BleFilter, Capability, CapabilitySet, MeasurementInfo, SelectableSensor, SensorValues,
};
use crate::time_series::{spawn_stream_capture, TimeSeriesCallback, TimeSeriesHandle};

pub const GDX_NAME_PREFIX: &str = "GDX";

/// One measurement channel as described by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct GdxChannel {
    pub number: u32,
    pub name: String,
    pub units: String,
    pub min: f64,
    pub max: f64,
}

impl GdxChannel {
    /// Capability this channel can stand in for, judged by its units.
    pub fn capability(&self) -> Option<Capability> {
        match self.units.as_str() {
            "°C" | "degC" => Some(Capability::Temperature),
            "lx" | "lux" => Some(Capability::Illuminance),
            "%RH" | "%" => Some(Capability::Humidity),
            _ => None,
        }
    }

    pub fn info(&self) -> MeasurementInfo {
        MeasurementInfo {
            name: self.name.clone(),
            units: self.units.clone(),
            min: self.min,
            max: self.max,
        }
    }
}

/// Vendor SDK entry point.
#[async_trait]
pub trait GdxSdk: Send + Sync {
    async fn open(&self, peripheral: Arc<dyn Peripheral>) -> Result<Arc<dyn GdxHandle>, SensorError>;
}

/// An opened GDX device.
#[async_trait]
pub trait GdxHandle: Send + Sync {
    fn channels(&self) -> Vec<GdxChannel>;

    async fn enable_channels(&self, numbers: &[u32]) -> Result<(), SensorError>;

    async fn set_measurement_period(&self, period: Duration) -> Result<(), SensorError>;

    async fn start(&self) -> Result<(), SensorError>;

    async fn stop(&self) -> Result<(), SensorError>;

    /// Most recent streamed value for a channel, if one arrived yet.
    fn latest_value(&self, number: u32) -> Option<f64>;

    /// Value-changed events for one channel; dropping the receiver unsubscribes.
    fn subscribe(&self, number: u32) -> mpsc::UnboundedReceiver<f64>;

    async fn close(&self);
}

pub struct GdxDevice {
    handle: Arc<dyn GdxHandle>,
    name: String,
    requested: CapabilitySet,
    channels: Vec<GdxChannel>,
    mapped: BTreeMap<Capability, u32>,
    selected: Option<u32>,
    poll_period: Duration,
    is_setup: bool,
}

impl GdxDevice {
    pub fn matches_name(name: &str) -> bool {
        name.starts_with(GDX_NAME_PREFIX)
    }

    pub fn filters() -> Vec<BleFilter> {
        vec![BleFilter::with_name_prefix(GDX_NAME_PREFIX)]
    }

    /// Opens the device through the SDK; the first channel starts out selected.
    ///
    /// Requested capabilities no channel can report are dropped; if none is left
    /// the handle is closed and the device rejected.
    pub async fn open(
        sdk: &dyn GdxSdk,
        peripheral: Arc<dyn Peripheral>,
        requested: CapabilitySet,
        poll_period: Duration,
    ) -> Result<Self, SensorError> {
        let name = peripheral.name().unwrap_or(GDX_NAME_PREFIX).to_string();
        let handle = sdk.open(peripheral).await?;
        let channels = handle.channels();
        info!("[{}] opened with {} channels", name, channels.len());

        let available: CapabilitySet = channels.iter().filter_map(GdxChannel::capability).collect();
        let requested = requested.intersection(&available);
        if requested.is_empty() {
            warn!("[{}] no channel reports a requested capability", name);
            handle.close().await;
            return Err(SensorError::NoCompatibleDevice);
        }

        Ok(Self {
            selected: channels.first().map(|c| c.number),
            handle,
            name,
            requested,
            channels,
            mapped: BTreeMap::new(),
            poll_period,
            is_setup: false,
        })
    }

    fn channel(&self, number: u32) -> Option<&GdxChannel> {
        self.channels.iter().find(|c| c.number == number)
    }

    fn channel_by_id(&self, id: &str) -> Option<&GdxChannel> {
        id.parse::<u32>().ok().and_then(|n| self.channel(n))
    }
}

#[async_trait]
impl Device for GdxDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.channels.iter().filter_map(GdxChannel::capability).collect()
    }

    fn requested_capabilities(&self) -> &CapabilitySet {
        &self.requested
    }

    async fn setup_read(&mut self) -> Result<(), SensorError> {
        let mut mapped = BTreeMap::new();
        for capability in self.requested.iter() {
            match self.channels.iter().find(|c| c.capability() == Some(capability)) {
                Some(channel) => {
                    mapped.insert(capability, channel.number);
                }
                None => debug!("[{}] no channel reports {}", self.name, capability),
            }
        }

        let numbers: Vec<u32> = mapped.values().copied().collect();
        if !numbers.is_empty() {
            self.handle.enable_channels(&numbers).await?;
            self.handle.set_measurement_period(self.poll_period).await?;
            self.handle.start().await?;
        }

        self.mapped = mapped;
        self.is_setup = true;
        Ok(())
    }

    async fn read(&mut self) -> Result<SensorValues, SensorError> {
        let mut values = SensorValues::new();
        for capability in self.requested.iter() {
            let number = self
                .mapped
                .get(&capability)
                .ok_or(SensorError::CapabilityNotConfigured(capability))?;
            values.insert(capability, self.handle.latest_value(*number));
        }
        Ok(values)
    }

    async fn teardown_read(&mut self) -> Result<(), SensorError> {
        if !self.is_setup {
            return Err(SensorError::NotSetUp);
        }
        self.is_setup = false;
        let was_streaming = !std::mem::take(&mut self.mapped).is_empty();
        if was_streaming {
            self.handle.stop().await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.handle.close().await;
    }

    fn supports_time_series(&self) -> bool {
        true
    }

    fn selectable_sensors(&self) -> Vec<SelectableSensor> {
        self.channels
            .iter()
            .map(|c| SelectableSensor {
                id: c.number.to_string(),
                info: c.info(),
            })
            .collect()
    }

    fn selected_sensor(&self) -> Option<String> {
        self.selected.map(|n| n.to_string())
    }

    fn select_sensor(&mut self, id: &str) -> Result<(), SensorError> {
        let number = self
            .channel_by_id(id)
            .map(|c| c.number)
            .ok_or_else(|| SensorError::UnknownSubSensor(id.to_string()))?;
        self.selected = Some(number);
        Ok(())
    }

    async fn collect_time_series(
        &mut self,
        period: Duration,
        sub_sensor: Option<&str>,
        callback: TimeSeriesCallback,
    ) -> Result<TimeSeriesHandle, SensorError> {
        let id = match sub_sensor {
            Some(id) => id.to_string(),
            None => self
                .selected_sensor()
                .ok_or_else(|| SensorError::UnknownSubSensor(String::new()))?,
        };
        let channel = self
            .channel_by_id(&id)
            .cloned()
            .ok_or(SensorError::UnknownSubSensor(id))?;

        self.handle.set_measurement_period(period).await?;
        self.handle.enable_channels(&[channel.number]).await?;
        self.handle.start().await?;
        let values = self.handle.subscribe(channel.number);
        info!(
            "[{}] time series on '{}' every {:?}",
            self.name, channel.name, period
        );

        // put the stream back to the polling rate once the capture ends
        let handle = self.handle.clone();
        let poll_period = self.poll_period;
        let restore = move || match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.set_measurement_period(poll_period).await {
                        warn!("failed to restore GDX measurement period: {}", e);
                    }
                });
            }
            Err(_) => warn!("no runtime to restore GDX measurement period"),
        };

        Ok(spawn_stream_capture(
            period,
            channel.info(),
            values,
            callback,
            Some(Box::new(restore)),
        ))
    }
}
