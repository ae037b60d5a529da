//! In-memory Bluetooth platform and GDX SDK used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use field_sensors::devices::{
    profiles::DeviceProfile, BluetoothPlatform, GdxChannel, GdxHandle, GdxSdk, Peripheral,
};
use field_sensors::error::{GattError, SensorError};
use field_sensors::sensor::{types::matches_any, BleFilter, Capability, DiscoveredDevice};

pub struct FakePeripheral {
    id: String,
    name: Option<String>,
    characteristics: Mutex<HashMap<(Uuid, Uuid), Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Uuid, Vec<u8>)>>,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakePeripheral {
    pub fn new(id: &str, name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.map(str::to_string),
            characteristics: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// A peripheral exposing every characteristic of `profile`, data set to zeros.
    pub fn for_profile(id: &str, name: &str, profile: &DeviceProfile) -> Self {
        let peripheral = Self::new(id, Some(name));
        for channel in profile.channels {
            peripheral.set_value(channel.service, channel.data, vec![0; 4]);
            if let Some(config) = channel.config {
                peripheral.set_value(channel.service, config, vec![0]);
            }
        }
        peripheral
    }

    pub fn set_value(&self, service: Uuid, characteristic: Uuid, value: Vec<u8>) {
        self.characteristics
            .lock()
            .insert((service, characteristic), value);
    }

    /// Sets the data bytes of `capability`'s channel in `profile`.
    pub fn set_reading(&self, profile: &DeviceProfile, capability: Capability, value: Vec<u8>) {
        let channel = profile.channel(capability).expect("profile channel");
        self.set_value(channel.service, channel.data, value);
    }

    pub fn remove(&self, service: Uuid, characteristic: Uuid) {
        self.characteristics.lock().remove(&(service, characteristic));
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn discovered(&self, services: Vec<Uuid>) -> DiscoveredDevice {
        DiscoveredDevice {
            id: self.id.clone(),
            name: self.name.clone(),
            rssi: Some(-55),
            services,
        }
    }
}

#[async_trait]
impl Peripheral for FakePeripheral {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn connect(&self) -> Result<(), GattError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), GattError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, GattError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GattError::Io("injected read failure".into()));
        }
        self.characteristics
            .lock()
            .get(&(service, characteristic))
            .cloned()
            .ok_or(GattError::CharacteristicNotFound {
                service,
                characteristic,
            })
    }

    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8]) -> Result<(), GattError> {
        let known = self
            .characteristics
            .lock()
            .contains_key(&(service, characteristic));
        if !known {
            return Err(GattError::CharacteristicNotFound {
                service,
                characteristic,
            });
        }
        self.writes
            .lock()
            .push((service, characteristic, value.to_vec()));
        Ok(())
    }
}

/// Scan results plus the peripherals they open to.
#[derive(Default)]
pub struct FakePlatform {
    devices: Mutex<Vec<DiscoveredDevice>>,
    peripherals: Mutex<HashMap<String, Arc<FakePeripheral>>>,
    scans: Mutex<Vec<Vec<BleFilter>>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, device: DiscoveredDevice, peripheral: Arc<FakePeripheral>) {
        self.peripherals.lock().insert(device.id.clone(), peripheral);
        self.devices.lock().push(device);
    }

    /// Filters passed to each scan so far.
    pub fn scans(&self) -> Vec<Vec<BleFilter>> {
        self.scans.lock().clone()
    }
}

#[async_trait]
impl BluetoothPlatform for FakePlatform {
    async fn scan(&self, filters: &[BleFilter]) -> Result<Vec<DiscoveredDevice>, GattError> {
        self.scans.lock().push(filters.to_vec());
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|d| matches_any(filters, d))
            .cloned()
            .collect())
    }

    async fn open(&self, id: &str) -> Result<Arc<dyn Peripheral>, GattError> {
        let peripheral = self
            .peripherals
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| GattError::DeviceNotFound(id.to_string()))?;
        Ok(peripheral)
    }
}

/// GDX handle whose stream is pushed by the test.
pub struct FakeGdx {
    channels: Vec<GdxChannel>,
    latest: Mutex<HashMap<u32, f64>>,
    subscribers: Mutex<Vec<(u32, mpsc::UnboundedSender<f64>)>>,
    pub enabled: Mutex<Vec<u32>>,
    pub periods: Mutex<Vec<Duration>>,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeGdx {
    pub fn new() -> Self {
        Self {
            channels: vec![
                GdxChannel {
                    number: 1,
                    name: "Temperature".into(),
                    units: "°C".into(),
                    min: -40.0,
                    max: 125.0,
                },
                GdxChannel {
                    number: 2,
                    name: "Force".into(),
                    units: "N".into(),
                    min: -50.0,
                    max: 50.0,
                },
            ],
            latest: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            enabled: Mutex::new(Vec::new()),
            periods: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Simulates a "value changed" event from the device.
    pub fn push(&self, number: u32, value: f64) {
        self.latest.lock().insert(number, value);
        self.subscribers
            .lock()
            .retain(|(n, tx)| *n != number || tx.send(value).is_ok());
    }

    /// Ends every subscription stream.
    pub fn hang_up(&self) {
        self.subscribers.lock().clear();
    }
}

#[async_trait]
impl GdxHandle for FakeGdx {
    fn channels(&self) -> Vec<GdxChannel> {
        self.channels.clone()
    }

    async fn enable_channels(&self, numbers: &[u32]) -> Result<(), SensorError> {
        self.enabled.lock().extend_from_slice(numbers);
        Ok(())
    }

    async fn set_measurement_period(&self, period: Duration) -> Result<(), SensorError> {
        self.periods.lock().push(period);
        Ok(())
    }

    async fn start(&self) -> Result<(), SensorError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SensorError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn latest_value(&self, number: u32) -> Option<f64> {
        self.latest.lock().get(&number).copied()
    }

    fn subscribe(&self, number: u32) -> mpsc::UnboundedReceiver<f64> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push((number, tx));
        rx
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// SDK that always opens the same fake handle.
pub struct FakeGdxSdk(pub Arc<FakeGdx>);

#[async_trait]
impl GdxSdk for FakeGdxSdk {
    async fn open(&self, _peripheral: Arc<dyn Peripheral>) -> Result<Arc<dyn GdxHandle>, SensorError> {
        Ok(self.0.clone())
    }
}
