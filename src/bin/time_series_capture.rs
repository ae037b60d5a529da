//! Non-interactive time-series capture (time_series_capture binary).
//!
//! Connects an auto-connecting mock sensor, captures one virtual sub-sensor until
//! the sample cap or the time limit, then writes the series to CSV.
//!
//! **Execution:**
//! 1. Load config (argv[1] / `FIELD_SENSORS_CONFIG` / defaults)
//! 2. Build the mock sensor (auto-connect) and select the sub-sensor
//! 3. Capture at `timeSeriesPeriodMs` until 1000 samples or `CAPTURE_LIMIT_SECS`
//! 4. Export `<output_dir>/<sub-sensor>_capture.csv`, disconnect, exit

use std::time::Duration;

use tokio::{sync::oneshot, time};
use log::{error, info};

use field_sensors::{
    config::AppConfig,
    mock::{MockSensor, MockSensorOptions},
    sensor::Sensor,
    time_series::TimeSeries,
    utils::export::export_time_series_csv,
};

const CAPTURE_LIMIT_SECS: u64 = 30;
const SUB_SENSOR: &str = "force";

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    env_logger::init();
    println!("=== TIME SERIES CAPTURE START ===");

    let config = match AppConfig::from_env_or_args() {
        Ok(config) => config,
        Err(e) => {
            error!("{}; using defaults", e);
            AppConfig::default()
        }
    };

    let mut options = MockSensorOptions::from_config(&config);
    options.auto_connect = true;
    options.show_device_picker = false;
    let sensor = MockSensor::new(options);

    if let Err(e) = sensor.select_sensor(SUB_SENSOR).await {
        error!("cannot select '{}': {}", SUB_SENSOR, e);
        return;
    }

    // fires once the capture hits the sample cap
    let (full_tx, full_rx) = oneshot::channel();
    let mut full_tx = Some(full_tx);
    let handle = match sensor
        .collect_time_series(
            config.time_series_period(),
            None,
            Box::new(move |series: &TimeSeries| {
                if series.is_full() {
                    if let Some(tx) = full_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }),
        )
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("time series failed to start: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = full_rx => info!("sample cap reached"),
        _ = time::sleep(Duration::from_secs(CAPTURE_LIMIT_SECS)) => info!("time limit reached"),
    }
    handle.stop();

    let series = handle.snapshot();
    println!(
        "Captured {} samples of {} every {} ms",
        series.len(),
        series.info().name,
        series.measurement_period_ms
    );
    match export_time_series_csv(
        &series,
        &config.output_dir,
        &format!("{}_capture.csv", SUB_SENSOR),
    ) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => error!("CSV export failed: {}", e),
    }

    sensor.disconnect().await;
    println!("=== TIME SERIES CAPTURE DONE ===");
}
