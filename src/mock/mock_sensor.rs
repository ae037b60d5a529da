//! mock_sensor.rs
//! Sensor with no transport, for demos and tests.
//!
//! Honors the full `Sensor` contract: the same connect lifecycle, events, error
//! latch and poll loop as hardware sensors (the simulated device goes through
//! `SensorCore` like any other), plus an optional fake device picker.

use async_trait::async_trait;
use rand::Rng;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use log::info;
use parking_lot::Mutex;

use crate::config::{
    AppConfig, DEFAULT_DEVICE_PICKER_COUNT, DEFAULT_REVERSAL_PROBABILITY,
    DEFAULT_STATIC_PROBABILITY,
};
use crate::error::SensorError;
use crate::mock::{
    generator::{entropy, Entropy, RandomWalk, SharedEntropy, WalkChannel},
    mock_device::MockDevice,
};
use crate::sensor::{
    core::SensorCore,
    types::{Capability, CapabilitySet, ConnectOptions, DiscoveredDevice, DEFAULT_POLL_INTERVAL},
    Sensor,
};

pub const MOCK_DEVICE_NAME: &str = "Mock Sensor";

/// Fake picker entries report RSSI in [-100, -30).
const RSSI_RANGE: std::ops::Range<i16> = -100..-30;

#[derive(Debug, Clone)]
pub struct MockSensorOptions {
    pub capabilities: CapabilitySet,
    /// Per-capability overrides of `Capability::default_range` / `default_increment`.
    pub min: BTreeMap<Capability, f64>,
    pub max: BTreeMap<Capability, f64>,
    pub increment: BTreeMap<Capability, f64>,
    pub static_probability: f64,
    pub reversal_probability: f64,
    pub poll_interval: Duration,
    pub auto_connect: bool,
    pub show_device_picker: bool,
    pub device_picker_count: usize,
    pub seed: Option<u64>,
}

impl Default for MockSensorOptions {
    fn default() -> Self {
        Self {
            capabilities: Capability::ALL.into_iter().collect(),
            min: BTreeMap::new(),
            max: BTreeMap::new(),
            increment: BTreeMap::new(),
            static_probability: DEFAULT_STATIC_PROBABILITY,
            reversal_probability: DEFAULT_REVERSAL_PROBABILITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            auto_connect: false,
            show_device_picker: false,
            device_picker_count: DEFAULT_DEVICE_PICKER_COUNT,
            seed: None,
        }
    }
}

impl MockSensorOptions {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capabilities: config.sensor.capabilities(),
            static_probability: config.mock.static_probability,
            reversal_probability: config.mock.reversal_probability,
            poll_interval: config.poll_interval(),
            auto_connect: config.mock.auto_connect,
            show_device_picker: config.mock.show_device_picker,
            device_picker_count: config.mock.device_picker_count,
            seed: config.mock.seed,
            ..Self::default()
        }
    }

    pub fn with_range(mut self, capability: Capability, min: f64, max: f64) -> Self {
        self.min.insert(capability, min);
        self.max.insert(capability, max);
        self
    }

    pub fn with_increment(mut self, capability: Capability, increment: f64) -> Self {
        self.increment.insert(capability, increment);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn bounds(&self, capability: Capability) -> (f64, f64, f64) {
        let (min, max) = capability.default_range();
        (
            self.min.get(&capability).copied().unwrap_or(min),
            self.max.get(&capability).copied().unwrap_or(max),
            self.increment
                .get(&capability)
                .copied()
                .unwrap_or_else(|| capability.default_increment()),
        )
    }
}

pub struct MockSensor {
    core: Arc<SensorCore>,
    options: MockSensorOptions,
    entropy: SharedEntropy,
}

impl MockSensor {
    pub fn new(options: MockSensorOptions) -> Self {
        let source = entropy(options.seed);
        Self::with_entropy(options, source)
    }

    /// Uses `source` for every random decision this sensor makes.
    pub fn with_entropy(options: MockSensorOptions, source: Entropy) -> Self {
        let core = Arc::new(SensorCore::new(
            options.capabilities.clone(),
            None,
            options.poll_interval,
        ));
        let sensor = Self {
            core,
            options,
            entropy: Arc::new(Mutex::new(source)),
        };

        if sensor.options.auto_connect {
            let generation = sensor.core.begin_connect();
            let mut device = sensor.device(MOCK_DEVICE_NAME);
            device.arm();
            let values = device.current_values();
            sensor.core.establish_ready(generation, Box::new(device), values);
        }
        sensor
    }

    pub fn options(&self) -> &MockSensorOptions {
        &self.options
    }

    fn device(&self, name: &str) -> MockDevice {
        let mut walk = RandomWalk::new(
            self.options.static_probability,
            self.options.reversal_probability,
        );
        {
            let mut rng = self.entropy.lock();
            for capability in self.options.capabilities.iter() {
                let (min, max, increment) = self.options.bounds(capability);
                walk.insert(
                    capability,
                    WalkChannel::random_start(&mut *rng, min, max, increment),
                );
            }
        }
        MockDevice::new(
            name,
            self.options.capabilities.clone(),
            walk,
            self.entropy.clone(),
            self.options.static_probability,
            self.options.reversal_probability,
        )
    }

    fn fake_devices(&self) -> Vec<DiscoveredDevice> {
        let mut rng = self.entropy.lock();
        (1..=self.options.device_picker_count)
            .map(|i| DiscoveredDevice {
                id: format!("mock-{i}"),
                name: Some(format!("{MOCK_DEVICE_NAME} {i}")),
                rssi: Some(rng.random_range(RSSI_RANGE)),
                services: Vec::new(),
            })
            .collect()
    }

    async fn bind(&self, generation: u64, options: &ConnectOptions) -> Result<(), SensorError> {
        let name = if self.options.show_device_picker || options.always_show_picker {
            let candidates = self.fake_devices();
            let chosen = self.core.discovery().await_selection(candidates).await?;
            self.core.ensure_current(generation)?;
            chosen.display_name().to_string()
        } else {
            MOCK_DEVICE_NAME.to_string()
        };

        info!("mock connecting as '{}'", name);
        let device = self.device(&name);
        self.core.establish(generation, Box::new(device)).await
    }
}

#[async_trait]
impl Sensor for MockSensor {
    fn core(&self) -> &Arc<SensorCore> {
        &self.core
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), SensorError> {
        let generation = self.core.restart_connect().await;
        let result = self.bind(generation, &options).await;
        self.core.finish_connect(generation, result)
    }
}
