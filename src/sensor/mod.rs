// Sensors: the connect/poll state machine and the contract every sensor exposes.
// core.rs holds the shared machinery; device_sensor.rs binds real BLE hardware,
// crate::mock supplies the simulated flavour; registry.rs caches live sensors.

pub mod core;
pub mod device_sensor;
pub mod discovery;
pub mod events;
pub mod registry;
pub mod types;

use async_trait::async_trait;
use crossbeam::channel::Receiver;
use std::{sync::Arc, time::Duration};

use crate::error::SensorError;
use crate::time_series::{TimeSeriesCallback, TimeSeriesHandle};

pub use self::core::{SensorCore, SensorStatus};
pub use device_sensor::DeviceSensor;
pub use discovery::DeviceDiscovery;
pub use events::{EventHub, ListenerId};
pub use registry::SensorRegistry;
pub use types::{
    BleFilter, Capability, CapabilitySet, ConnectOptions, ConnectionState, DiscoveredDevice,
    MeasurementInfo, SelectableSensor, SensorEvent, SensorValues, DEFAULT_POLL_INTERVAL,
};

/// What the UI talks to. Implementors supply `connect`; the rest delegates to the core.
#[async_trait]
pub trait Sensor: Send + Sync {
    fn core(&self) -> &Arc<SensorCore>;

    /// Finds, binds and starts polling a device. Replaces any current binding.
    async fn connect(&self, options: ConnectOptions) -> Result<(), SensorError>;

    async fn disconnect(&self) {
        self.core().disconnect().await
    }

    fn capabilities(&self) -> CapabilitySet {
        self.core().capabilities().clone()
    }

    fn state(&self) -> ConnectionState {
        self.core().state()
    }

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    fn device_name(&self) -> Option<String> {
        self.core().device_name()
    }

    fn values(&self) -> SensorValues {
        self.core().values()
    }

    fn error(&self) -> Option<SensorError> {
        self.core().error()
    }

    fn set_error(&self, error: Option<SensorError>) {
        self.core().set_error(error)
    }

    fn add_listener(&self, listener: Box<dyn Fn(&SensorEvent) + Send + Sync>) -> ListenerId {
        self.core().add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.core().remove_listener(id)
    }

    fn subscribe(&self) -> Receiver<SensorEvent> {
        self.core().events().subscribe()
    }

    /// Candidates of a connect waiting on the device picker.
    fn pending_devices(&self) -> Option<Vec<DiscoveredDevice>> {
        self.core().discovery().pending()
    }

    async fn devices_found(&self) -> Vec<DiscoveredDevice> {
        self.core().discovery().devices_found().await
    }

    fn select_device(&self, id: &str) -> Result<(), SensorError> {
        self.core().discovery().select(id)
    }

    fn cancel_device_selection(&self) -> bool {
        self.core().discovery().cancel()
    }

    async fn supports_time_series(&self) -> bool {
        self.core().supports_time_series().await
    }

    async fn selectable_sensors(&self) -> Vec<SelectableSensor> {
        self.core().selectable_sensors().await
    }

    async fn selected_sensor(&self) -> Option<String> {
        self.core().selected_sensor().await
    }

    async fn select_sensor(&self, id: &str) -> Result<(), SensorError> {
        self.core().select_sensor(id).await
    }

    async fn collect_time_series(
        &self,
        period: Duration,
        sub_sensor: Option<&str>,
        callback: TimeSeriesCallback,
    ) -> Result<TimeSeriesHandle, SensorError> {
        self.core()
            .collect_time_series(period, sub_sensor, callback)
            .await
    }
}
