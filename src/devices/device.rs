//! device.rs
//! The three-phase device contract driven by the sensor poll loop.
//!
//! setup_read → read (repeated) → teardown_read. `read` and `teardown_read`
//! reject until `setup_read` has completed.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::error::SensorError;
use crate::sensor::types::{CapabilitySet, SelectableSensor, SensorValues};
use crate::time_series::{TimeSeriesCallback, TimeSeriesHandle};

#[async_trait]
pub trait Device: Send {
    /// Name shown to the user while connected.
    fn name(&self) -> &str;

    /// Everything the hardware can report.
    fn capabilities(&self) -> CapabilitySet;

    /// The subset this binding reads.
    fn requested_capabilities(&self) -> &CapabilitySet;

    /// Arms the channels for every requested capability the device supports.
    async fn setup_read(&mut self) -> Result<(), SensorError>;

    /// One value per requested capability.
    async fn read(&mut self) -> Result<SensorValues, SensorError>;

    /// Releases the channels armed by `setup_read`.
    async fn teardown_read(&mut self) -> Result<(), SensorError>;

    /// Drops the transport link. Called once, after `teardown_read`.
    async fn disconnect(&mut self);

    fn supports_time_series(&self) -> bool {
        false
    }

    fn selectable_sensors(&self) -> Vec<SelectableSensor> {
        Vec::new()
    }

    fn selected_sensor(&self) -> Option<String> {
        None
    }

    fn select_sensor(&mut self, id: &str) -> Result<(), SensorError> {
        Err(SensorError::UnknownSubSensor(id.to_string()))
    }

    /// Starts a capture on `sub_sensor` (or the selected one).
    async fn collect_time_series(
        &mut self,
        _period: Duration,
        _sub_sensor: Option<&str>,
        _callback: TimeSeriesCallback,
    ) -> Result<TimeSeriesHandle, SensorError> {
        Err(SensorError::TimeSeriesUnsupported)
    }
}

/// Device access shared by the poll task and time-series starts.
pub type SharedDevice = Arc<tokio::sync::Mutex<Box<dyn Device>>>;
