//! mock_device.rs
//! Simulated device: random-walk readings plus two virtual sub-sensors for
//! time-series capture, so UI and export paths match real multi-sensor hardware.

use async_trait::async_trait;
use std::time::Duration;
use log::debug;

use crate::devices::Device;
use crate::error::SensorError;
use crate::mock::generator::{RandomWalk, SharedEntropy, WalkChannel};
use crate::sensor::types::{
    Capability, CapabilitySet, MeasurementInfo, SelectableSensor, SensorValues,
};
use crate::time_series::{spawn_interval_capture, TimeSeriesCallback, TimeSeriesHandle};

/// Selectable channels of the mock's time-series mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualSensor {
    Force,
    Temperature,
}

impl VirtualSensor {
    pub const ALL: [VirtualSensor; 2] = [VirtualSensor::Force, VirtualSensor::Temperature];

    pub fn id(&self) -> &'static str {
        match self {
            VirtualSensor::Force => "force",
            VirtualSensor::Temperature => "temperature",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }

    pub fn base_value(&self) -> f64 {
        match self {
            VirtualSensor::Force => 100.0,
            VirtualSensor::Temperature => 25.0,
        }
    }

    pub fn increment(&self) -> f64 {
        match self {
            VirtualSensor::Force => 2.0,
            VirtualSensor::Temperature => 0.2,
        }
    }

    pub fn info(&self) -> MeasurementInfo {
        let (name, units, max) = match self {
            VirtualSensor::Force => ("Force", "N", 200.0),
            VirtualSensor::Temperature => ("Temperature", "°C", 50.0),
        };
        MeasurementInfo {
            name: name.to_string(),
            units: units.to_string(),
            min: 0.0,
            max,
        }
    }

    fn channel(&self) -> WalkChannel {
        let info = self.info();
        WalkChannel::new(info.min, info.max, self.increment(), self.base_value())
    }
}

pub struct MockDevice {
    name: String,
    requested: CapabilitySet,
    walk: RandomWalk<Capability>,
    entropy: SharedEntropy,
    static_probability: f64,
    reversal_probability: f64,
    selected: VirtualSensor,
    is_setup: bool,
}

impl MockDevice {
    pub fn new(
        name: &str,
        requested: CapabilitySet,
        walk: RandomWalk<Capability>,
        entropy: SharedEntropy,
        static_probability: f64,
        reversal_probability: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            requested,
            walk,
            entropy,
            static_probability,
            reversal_probability,
            selected: VirtualSensor::Force,
            is_setup: false,
        }
    }

    /// Marks the device set up without awaiting; there is nothing to arm.
    pub fn arm(&mut self) {
        self.is_setup = true;
    }

    /// Current walk position for every requested capability.
    pub fn current_values(&self) -> SensorValues {
        self.requested
            .iter()
            .map(|c| (c, self.walk.value(c)))
            .collect()
    }
}

#[async_trait]
impl Device for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        Capability::ALL.into_iter().collect()
    }

    fn requested_capabilities(&self) -> &CapabilitySet {
        &self.requested
    }

    async fn setup_read(&mut self) -> Result<(), SensorError> {
        self.arm();
        Ok(())
    }

    async fn read(&mut self) -> Result<SensorValues, SensorError> {
        if !self.is_setup {
            if let Some(capability) = self.requested.iter().next() {
                return Err(SensorError::CapabilityNotConfigured(capability));
            }
        }
        let stepped = {
            let mut rng = self.entropy.lock();
            self.walk.step(&mut *rng)
        };
        Ok(self
            .requested
            .iter()
            .map(|c| (c, stepped.get(&c).copied()))
            .collect())
    }

    async fn teardown_read(&mut self) -> Result<(), SensorError> {
        if !self.is_setup {
            return Err(SensorError::NotSetUp);
        }
        self.is_setup = false;
        Ok(())
    }

    async fn disconnect(&mut self) {
        debug!("[{}] mock link closed", self.name);
    }

    fn supports_time_series(&self) -> bool {
        true
    }

    fn selectable_sensors(&self) -> Vec<SelectableSensor> {
        VirtualSensor::ALL
            .iter()
            .map(|v| SelectableSensor {
                id: v.id().to_string(),
                info: v.info(),
            })
            .collect()
    }

    fn selected_sensor(&self) -> Option<String> {
        Some(self.selected.id().to_string())
    }

    fn select_sensor(&mut self, id: &str) -> Result<(), SensorError> {
        self.selected =
            VirtualSensor::from_id(id).ok_or_else(|| SensorError::UnknownSubSensor(id.to_string()))?;
        Ok(())
    }

    async fn collect_time_series(
        &mut self,
        period: Duration,
        sub_sensor: Option<&str>,
        callback: TimeSeriesCallback,
    ) -> Result<TimeSeriesHandle, SensorError> {
        let sensor = match sub_sensor {
            Some(id) => VirtualSensor::from_id(id)
                .ok_or_else(|| SensorError::UnknownSubSensor(id.to_string()))?,
            None => self.selected,
        };
        debug!("[{}] time series on '{}' every {:?}", self.name, sensor.id(), period);

        let mut channel = sensor.channel();
        let entropy = self.entropy.clone();
        let (sp, rp) = (self.static_probability, self.reversal_probability);
        let sample = move || {
            let mut rng = entropy.lock();
            channel.step(&mut *rng, sp, rp)
        };

        Ok(spawn_interval_capture(period, sensor.info(), sample, callback))
    }
}
