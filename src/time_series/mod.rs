//! Time-series capture: bounded sample streams decoupled from the poll loop.
//!
//! A capture is started explicitly, ticks at its own measurement period, and
//! re-delivers the whole accumulated series to its callback on every sample.

pub mod collector;

pub use collector::{
    spawn_interval_capture, spawn_stream_capture, TimeSeries, TimeSeriesCallback,
    TimeSeriesHandle, TimeSeriesSample, MAX_TIME_SERIES_SAMPLES,
};
