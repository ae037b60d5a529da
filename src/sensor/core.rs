//! core.rs
//! Connection state machine and poll loop shared by every sensor flavour.
//!
//! States: Disconnected → Connecting → Connected → Disconnected. Errors are an
//! orthogonal signal: the first error after a connect is latched and emitted,
//! later ones are dropped until the latch is cleared.
//!
//! Each connect attempt takes a new generation number. A disconnect or a newer
//! connect bumps the generation, so anything an older attempt finishes later
//! (a selection, a GATT connect, an in-flight read) is discarded.
//!
//! Polling is fixed-delay: sleep `poll_interval`, read, apply, repeat. Only one
//! read is ever in flight. Shutdown cancels the sleep; the loop then performs
//! its last poll (teardown) and releases the device.

use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{oneshot, Mutex as AsyncMutex},
    task::JoinHandle,
    time,
};
use log::{debug, error, info, warn};

use crate::devices::{Device, SharedDevice};
use crate::error::SensorError;
use crate::sensor::{
    discovery::DeviceDiscovery,
    events::{EventHub, ListenerId},
    types::{
        BleFilter, CapabilitySet, ConnectionState, SelectableSensor, SensorEvent, SensorValues,
    },
};
use crate::time_series::{TimeSeriesCallback, TimeSeriesHandle};

#[derive(Debug, Clone)]
pub struct SensorStatus {
    pub state: ConnectionState,
    pub device_name: Option<String>,
    pub values: SensorValues,
    pub error: Option<SensorError>,
}

/// The live device binding and the task polling it.
struct Binding {
    device: SharedDevice,
    shutdown: oneshot::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl Binding {
    async fn release(self) {
        let _ = self.shutdown.send(());
        match self.task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("poll task ended abnormally: {}", e);
                }
            }
            // never polled: do the last poll here
            None => release_device(&self.device).await,
        }
    }
}

pub struct SensorCore {
    capabilities: CapabilitySet,
    filters: Option<Vec<BleFilter>>,
    poll_interval: Duration,
    status: Mutex<SensorStatus>,
    generation: AtomicU64,
    /// Set while `connect` drops the previous binding before rebinding.
    replacing: AtomicBool,
    binding: Mutex<Option<Binding>>,
    events: EventHub,
    discovery: DeviceDiscovery,
}

impl SensorCore {
    pub fn new(
        capabilities: CapabilitySet,
        filters: Option<Vec<BleFilter>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            status: Mutex::new(SensorStatus {
                state: ConnectionState::Disconnected,
                device_name: None,
                values: capabilities.empty_values(),
                error: None,
            }),
            capabilities,
            filters,
            poll_interval,
            generation: AtomicU64::new(0),
            replacing: AtomicBool::new(false),
            binding: Mutex::new(None),
            events: EventHub::new(),
            discovery: DeviceDiscovery::new(),
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn filters(&self) -> Option<&[BleFilter]> {
        self.filters.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn status(&self) -> SensorStatus {
        self.status.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn device_name(&self) -> Option<String> {
        self.status.lock().device_name.clone()
    }

    pub fn values(&self) -> SensorValues {
        self.status.lock().values.clone()
    }

    pub fn error(&self) -> Option<SensorError> {
        self.status.lock().error.clone()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn discovery(&self) -> &DeviceDiscovery {
        &self.discovery
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SensorEvent) + Send + Sync + 'static,
    {
        self.events.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Latches `error` if nothing is latched yet; `None` clears the latch.
    pub fn set_error(&self, error: Option<SensorError>) {
        let latched = {
            let mut status = self.status.lock();
            match (&status.error, error) {
                (_, None) => {
                    status.error = None;
                    None
                }
                (Some(_), Some(suppressed)) => {
                    debug!("suppressing error while one is latched: {}", suppressed);
                    None
                }
                (None, Some(error)) => {
                    status.error = Some(error.clone());
                    Some((status.device_name.clone(), error))
                }
            }
        };

        if let Some((device_name, error)) = latched {
            warn!("sensor error: {}", error);
            self.events.emit(SensorEvent::Error { device_name, error });
        }
    }

    /// Starts a new connect attempt and returns its generation.
    pub fn begin_connect(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut status = self.status.lock();
            status.state = ConnectionState::Connecting;
            status.device_name = None;
            status.error = None;
        }
        debug!("connect attempt #{}", generation);
        self.events.emit(SensorEvent::Connecting);
        generation
    }

    /// Drops whatever binding exists, then starts a new attempt.
    ///
    /// The disconnection this emits is flagged by `is_replacing`.
    pub async fn restart_connect(&self) -> u64 {
        self.replacing.store(true, Ordering::SeqCst);
        self.disconnect().await;
        self.replacing.store(false, Ordering::SeqCst);
        self.begin_connect()
    }

    /// True while a connect is tearing down the binding it replaces.
    pub fn is_replacing(&self) -> bool {
        self.replacing.load(Ordering::SeqCst)
    }

    /// Err(Superseded) once a newer attempt or a disconnect has happened.
    pub fn ensure_current(&self, generation: u64) -> Result<(), SensorError> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(SensorError::Superseded)
        }
    }

    /// True while `generation` is the newest connect attempt.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Reports a failed connect attempt unless it was already superseded.
    pub fn fail_connect(&self, generation: u64, error: SensorError) {
        if !self.is_current(generation) {
            debug!("dropping failure of superseded connect #{}: {}", generation, error);
            return;
        }
        self.set_error(Some(error));
        self.mark_disconnected();
    }

    /// Maps the outcome of a connect attempt: failures of the newest attempt are
    /// latched and end in Disconnected; an overtaken attempt reports `Superseded`.
    pub fn finish_connect(
        &self,
        generation: u64,
        result: Result<(), SensorError>,
    ) -> Result<(), SensorError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if !self.is_current(generation) => {
                debug!("connect #{} overtaken: {}", generation, e);
                Err(SensorError::Superseded)
            }
            Err(e) => {
                self.fail_connect(generation, e.clone());
                Err(e)
            }
        }
    }

    fn mark_connected(&self, generation: u64, device_name: &str, values: SensorValues) -> bool {
        {
            let mut status = self.status.lock();
            if !self.is_current(generation) {
                return false;
            }
            status.state = ConnectionState::Connected;
            status.device_name = Some(device_name.to_string());
            status.values = values;
        }
        info!("[{}] connected", device_name);
        self.events.emit(SensorEvent::Connection {
            connected: true,
            device_name: Some(device_name.to_string()),
        });
        true
    }

    fn mark_disconnected(&self) {
        let previous = {
            let mut status = self.status.lock();
            let previous = status.state;
            status.state = ConnectionState::Disconnected;
            status.device_name = None;
            previous
        };
        if previous != ConnectionState::Disconnected {
            info!("sensor disconnected");
            self.events.emit(SensorEvent::Connection {
                connected: false,
                device_name: None,
            });
        }
    }

    /// Binds `device` for `generation`: connected event, first poll, then the poll loop.
    ///
    /// On setup failure the device is dropped and the error returned; pass the
    /// result through `finish_connect` to latch it and settle the state.
    pub async fn establish(
        self: &Arc<Self>,
        generation: u64,
        mut device: Box<dyn Device>,
    ) -> Result<(), SensorError> {
        let name = device.name().to_string();
        let initial = device.requested_capabilities().empty_values();
        if !self.mark_connected(generation, &name, initial) {
            device.disconnect().await;
            return Err(SensorError::Superseded);
        }

        if let Err(e) = device.setup_read().await {
            // never leave a half-initialised device bound
            error!("[{}] setup failed: {}", name, e);
            device.disconnect().await;
            return Err(e);
        }

        let first = device.read().await;
        if !self.is_current(generation) {
            release_boxed(&mut device).await;
            return Err(SensorError::Superseded);
        }
        self.apply_read(first);

        if let Err(mut device) = self.start_polling(generation, device) {
            release_boxed(&mut device).await;
            return Err(SensorError::Superseded);
        }
        Ok(())
    }

    /// Binds a device whose channels are already armed, without awaiting anything.
    ///
    /// Used for sensors that must be live right after construction.
    pub fn establish_ready(
        self: &Arc<Self>,
        generation: u64,
        device: Box<dyn Device>,
        values: SensorValues,
    ) -> bool {
        let name = device.name().to_string();
        if !self.mark_connected(generation, &name, values.clone()) {
            return false;
        }
        self.events.emit(SensorEvent::Values {
            device_name: Some(name),
            values,
        });
        self.start_polling(generation, device).is_ok()
    }

    /// Installs the binding for `generation` and spawns its poll loop.
    ///
    /// The generation is checked under the binding lock, which `disconnect`
    /// also takes after bumping it; a superseded attempt gets its device back.
    fn start_polling(
        self: &Arc<Self>,
        generation: u64,
        device: Box<dyn Device>,
    ) -> Result<(), Box<dyn Device>> {
        let mut binding = self.binding.lock();
        if !self.is_current(generation) {
            debug!("binding #{} superseded before polling started", generation);
            return Err(device);
        }

        let device: SharedDevice = Arc::new(AsyncMutex::new(device));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(poll_loop(
                self.clone(),
                generation,
                device.clone(),
                shutdown_rx,
            ))),
            Err(_) => {
                warn!(
                    "no async runtime available; values stay at their initial reading until reconnected"
                );
                None
            }
        };

        let previous = binding.replace(Binding {
            device,
            shutdown,
            task,
        });
        drop(binding);
        if let Some(previous) = previous {
            // a stale attempt raced us; its loop exits on the generation check
            let _ = previous.shutdown.send(());
        }
        Ok(())
    }

    fn apply_read(&self, result: Result<SensorValues, SensorError>) {
        match result {
            Ok(values) => {
                let device_name = {
                    let mut status = self.status.lock();
                    status.values = values.clone();
                    status.device_name.clone()
                };
                debug!("values {:?}", values);
                self.events.emit(SensorEvent::Values {
                    device_name,
                    values,
                });
            }
            Err(e) => self.set_error(Some(e)),
        }
    }

    /// Tears down the active binding. No-op beyond state normalisation when idle.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.discovery.cancel();
        self.mark_disconnected();

        let binding = self.binding.lock().take();
        if let Some(binding) = binding {
            binding.release().await;
        }
    }

    /// The bound device, while a binding exists.
    pub fn device(&self) -> Option<SharedDevice> {
        self.binding.lock().as_ref().map(|b| b.device.clone())
    }

    pub async fn selectable_sensors(&self) -> Vec<SelectableSensor> {
        match self.device() {
            Some(device) => device.lock().await.selectable_sensors(),
            None => Vec::new(),
        }
    }

    pub async fn selected_sensor(&self) -> Option<String> {
        match self.device() {
            Some(device) => device.lock().await.selected_sensor(),
            None => None,
        }
    }

    pub async fn select_sensor(&self, id: &str) -> Result<(), SensorError> {
        let device = self.device().ok_or(SensorError::NotConnected)?;
        let mut device = device.lock().await;
        device.select_sensor(id)
    }

    pub async fn supports_time_series(&self) -> bool {
        match self.device() {
            Some(device) => device.lock().await.supports_time_series(),
            None => false,
        }
    }

    pub async fn collect_time_series(
        &self,
        period: Duration,
        sub_sensor: Option<&str>,
        callback: TimeSeriesCallback,
    ) -> Result<TimeSeriesHandle, SensorError> {
        let device = self.device().ok_or(SensorError::NotConnected)?;
        let mut device = device.lock().await;
        device.collect_time_series(period, sub_sensor, callback).await
    }
}

async fn poll_loop(
    core: Arc<SensorCore>,
    generation: u64,
    device: SharedDevice,
    mut shutdown: oneshot::Receiver<()>,
) {
    let interval = core.poll_interval();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = time::sleep(interval) => {}
        }

        let result = {
            let mut device = device.lock().await;
            device.read().await
        };
        if !core.is_current(generation) {
            debug!("discarding read from superseded binding #{}", generation);
            break;
        }
        core.apply_read(result);
    }

    release_device(&device).await;
}

/// Last poll: teardown, then drop the transport.
async fn release_device(device: &SharedDevice) {
    let mut device = device.lock().await;
    release_boxed(&mut device).await;
}

async fn release_boxed(device: &mut Box<dyn Device>) {
    if let Err(e) = device.teardown_read().await {
        warn!("[{}] teardown failed: {}", device.name(), e);
    }
    device.disconnect().await;
    debug!("[{}] released", device.name());
}
