//! collector.rs
//! Bounded time-series capture with a synchronous stop guarantee.
//!
//! - Samples are capped at `MAX_TIME_SERIES_SAMPLES`; the capped delivery is terminal.
//! - Each delivery hands the callback the full series so far, not a delta.
//! - `TimeSeriesHandle::stop()` returns only once no callback is running, and none
//!   runs afterwards. Calling it from inside the callback is allowed.
//!
//! Two drivers feed a capture: a timer calling a sampling closure (mock sensors) and
//! a channel of values pushed by a vendor SDK subscription (GDX devices).

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::{
    cell::{Cell, RefCell},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use log::debug;

use crate::sensor::types::MeasurementInfo;

pub const MAX_TIME_SERIES_SAMPLES: usize = 1_000;

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesSample {
    pub time_ms: u64,
    pub value: f64,
    /// Present on the first sample only.
    #[serde(skip)]
    pub info: Option<MeasurementInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub measurement_period_ms: u64,
    pub samples: Vec<TimeSeriesSample>,
    info: MeasurementInfo,
}

impl TimeSeries {
    pub fn new(measurement_period: Duration, info: MeasurementInfo) -> Self {
        Self {
            measurement_period_ms: measurement_period.as_millis() as u64,
            samples: Vec::new(),
            info,
        }
    }

    /// Metadata snapshot taken when the capture started.
    pub fn info(&self) -> &MeasurementInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= MAX_TIME_SERIES_SAMPLES
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    fn push(&mut self, value: f64) {
        let index = self.samples.len() as u64;
        let info = self.samples.is_empty().then(|| self.info.clone());
        self.samples.push(TimeSeriesSample {
            time_ms: index * self.measurement_period_ms,
            value,
            info,
        });
    }
}

pub type TimeSeriesCallback = Box<dyn FnMut(&TimeSeries) + Send>;

type StopHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Continue,
    Finished,
    Stopped,
}

struct CaptureCell {
    stopped: Cell<bool>,
    series: RefCell<TimeSeries>,
    callback: RefCell<TimeSeriesCallback>,
}

/// Shared between the driver task and the handle.
struct Capture {
    cell: ReentrantMutex<CaptureCell>,
    on_stop: Mutex<Option<StopHook>>,
}

impl Capture {
    fn new(series: TimeSeries, callback: TimeSeriesCallback, on_stop: Option<StopHook>) -> Self {
        Self {
            cell: ReentrantMutex::new(CaptureCell {
                stopped: Cell::new(false),
                series: RefCell::new(series),
                callback: RefCell::new(callback),
            }),
            on_stop: Mutex::new(on_stop),
        }
    }

    fn deliver(&self, value: f64) -> Delivery {
        let cell = self.cell.lock();
        if cell.stopped.get() {
            return Delivery::Stopped;
        }

        cell.series.borrow_mut().push(value);

        let full = {
            let series = cell.series.borrow();
            let full = series.is_full();
            if full {
                cell.stopped.set(true);
            }
            (cell.callback.borrow_mut())(&series);
            full
        };

        if full {
            Delivery::Finished
        } else if cell.stopped.get() {
            Delivery::Stopped
        } else {
            Delivery::Continue
        }
    }

    /// Marks the capture stopped; false if it already was.
    fn halt(&self) -> bool {
        let cell = self.cell.lock();
        !cell.stopped.replace(true)
    }

    fn run_stop_hook(&self) {
        let hook = self.on_stop.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn is_stopped(&self) -> bool {
        self.cell.lock().stopped.get()
    }

    fn snapshot(&self) -> TimeSeries {
        self.cell.lock().series.borrow().clone()
    }
}

/// Handle to a running capture. Dropping it detaches the capture.
pub struct TimeSeriesHandle {
    capture: Arc<Capture>,
    task: JoinHandle<()>,
}

impl TimeSeriesHandle {
    /// Stops the capture. No callback runs after this returns.
    pub fn stop(&self) {
        if self.capture.halt() {
            debug!("time series stopped after {} samples", self.capture.snapshot().len());
            self.task.abort();
        }
        self.capture.run_stop_hook();
    }

    /// True once stopped or capped.
    pub fn is_finished(&self) -> bool {
        self.capture.is_stopped()
    }

    pub fn snapshot(&self) -> TimeSeries {
        self.capture.snapshot()
    }
}

/// Samples `sample()` every `period` until stopped or capped.
pub fn spawn_interval_capture<F>(
    period: Duration,
    info: MeasurementInfo,
    mut sample: F,
    callback: TimeSeriesCallback,
) -> TimeSeriesHandle
where
    F: FnMut() -> f64 + Send + 'static,
{
    let period = period.max(MIN_PERIOD);
    let capture = Arc::new(Capture::new(TimeSeries::new(period, info), callback, None));

    let driver = capture.clone();
    let task = tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match driver.deliver(sample()) {
                Delivery::Continue => {}
                Delivery::Finished => {
                    debug!("time series reached {} samples", MAX_TIME_SERIES_SAMPLES);
                    driver.run_stop_hook();
                    break;
                }
                Delivery::Stopped => break,
            }
        }
    });

    TimeSeriesHandle { capture, task }
}

/// Forwards values pushed on `values` until stopped, capped, or the sender closes.
///
/// `on_stop` runs exactly once, whichever of those ends the capture.
pub fn spawn_stream_capture(
    period: Duration,
    info: MeasurementInfo,
    mut values: mpsc::UnboundedReceiver<f64>,
    callback: TimeSeriesCallback,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
) -> TimeSeriesHandle {
    let capture = Arc::new(Capture::new(TimeSeries::new(period, info), callback, on_stop));

    let driver = capture.clone();
    let task = tokio::spawn(async move {
        while let Some(value) = values.recv().await {
            match driver.deliver(value) {
                Delivery::Continue => {}
                Delivery::Finished | Delivery::Stopped => break,
            }
        }
        driver.halt();
        driver.run_stop_hook();
    });

    TimeSeriesHandle { capture, task }
}
