//! # Field Sensors Console
//! Interactive front end over the sensor layer, running against the mock sensor.
//!
//! ## Modes
//! - **Live values:** connects (if needed) and prints the next polled readings.
//! - **Time series:** captures one virtual sub-sensor and exports it to CSV.
//! - **Device picker:** reconnects through the pending-selection flow.
//!
//! ## Config
//! JSON file from the first argument or `FIELD_SENSORS_CONFIG`; defaults otherwise.
//!
//! ## Outputs
//! - `<output_dir>/<sub-sensor>_<epoch secs>.csv`, one row per sample.

use field_sensors::{
    config::AppConfig,
    mock::{MockSensor, MockSensorOptions},
    sensor::{ConnectOptions, Sensor, SensorEvent, SensorRegistry, SensorValues},
    time_series::TimeSeries,
    utils::export::export_time_series_csv,
};

use std::{
    io::{stdout, Write},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
    time,
};
use log::{debug, error, info};

const LIVE_READINGS: usize = 10;
const DEFAULT_CAPTURE_SECS: u64 = 5;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("=== FIELD SENSORS START ===");

    let config = match AppConfig::from_env_or_args() {
        Ok(config) => config,
        Err(e) => {
            error!("{}; using defaults", e);
            AppConfig::default()
        }
    };
    let registry = build_registry(&config);
    let mut input = BufReader::new(stdin()).lines();

    loop {
        let choice = prompt_menu(&mut input).await;
        match choice.as_str() {
            "1" | "" => watch_values(&registry, &config, &mut input).await,
            "2" => capture_time_series(&registry, &config, &mut input).await,
            "3" => {
                let sensor = registry.get(&config.sensor);
                connect_with_picker(&sensor, &mut input).await;
            }
            "4" => {
                if registry.contains(&config.sensor) {
                    registry.get(&config.sensor).disconnect().await;
                }
                println!("Disconnected.");
            }
            "5" => {
                registry.disconnect_all().await;
                println!("Exiting. Goodbye!");
                info!("=== FIELD SENSORS FINISHED ===");
                return;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }
}

fn build_registry(config: &AppConfig) -> SensorRegistry {
    let base = config.clone();
    SensorRegistry::new(move |sensor_config| {
        let mut options = MockSensorOptions::from_config(&base);
        options.capabilities = sensor_config.capabilities();
        Arc::new(MockSensor::new(options)) as Arc<dyn Sensor>
    })
}

/// None once stdin is closed.
async fn read_answer(input: &mut Input, text: &str) -> Option<String> {
    print!("{}", text);
    let _ = stdout().flush();
    match input.next_line().await {
        Ok(Some(line)) => Some(line.trim().to_string()),
        _ => None,
    }
}

async fn prompt(input: &mut Input, text: &str) -> String {
    read_answer(input, text).await.unwrap_or_default()
}

async fn prompt_menu(input: &mut Input) -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     FIELD SENSORS                           │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Live values                             │");
    println!("│  2) Time series capture → CSV               │");
    println!("│  3) Connect via device picker               │");
    println!("│  4) Disconnect                              │");
    println!("│  5) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    // end of input exits
    read_answer(input, "Select [1/2/3/4/5] (default: 1): ")
        .await
        .unwrap_or_else(|| "5".to_string())
}

fn format_values(values: &SensorValues) -> String {
    values
        .iter()
        .map(|(capability, value)| match value {
            Some(v) => format!("{}={:.2} {}", capability, v, capability.units()),
            None => format!("{}=--", capability),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// Connects unless already connected; the picker is used when the sensor asks for it.
async fn ensure_connected(sensor: &Arc<dyn Sensor>, config: &AppConfig, input: &mut Input) -> bool {
    if sensor.is_connected() {
        return true;
    }
    if config.mock.show_device_picker {
        return connect_with_picker(sensor, input).await;
    }
    match sensor.connect(ConnectOptions::default()).await {
        Ok(()) => true,
        Err(e) => {
            println!("Connect failed: {}", e);
            false
        }
    }
}

async fn connect_with_picker(sensor: &Arc<dyn Sensor>, input: &mut Input) -> bool {
    let connecting = {
        let sensor = sensor.clone();
        tokio::spawn(async move {
            sensor
                .connect(ConnectOptions {
                    always_show_picker: true,
                    ..ConnectOptions::default()
                })
                .await
        })
    };

    let devices = sensor.devices_found().await;
    for (i, device) in devices.iter().enumerate() {
        let rssi = device.rssi.map(|r| format!("{} dBm", r)).unwrap_or_default();
        println!("  {}) {} {}", i + 1, device.display_name(), rssi);
    }
    let answer = prompt(input, "Select device (blank cancels): ").await;
    let chosen = answer
        .parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| devices.get(i));
    match chosen {
        Some(device) => {
            if let Err(e) = sensor.select_device(&device.id) {
                println!("{}", e);
            }
        }
        None => {
            sensor.cancel_device_selection();
        }
    }

    match connecting.await {
        Ok(Ok(())) => {
            println!("Connected to {}", sensor.device_name().unwrap_or_default());
            true
        }
        Ok(Err(e)) => {
            println!("Connect failed: {}", e);
            false
        }
        Err(e) => {
            error!("connect task failed: {}", e);
            false
        }
    }
}

async fn watch_values(registry: &SensorRegistry, config: &AppConfig, input: &mut Input) {
    let sensor = registry.get(&config.sensor);
    if !ensure_connected(&sensor, config, input).await {
        return;
    }
    println!("Current: {}", format_values(&sensor.values()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = sensor.add_listener(Box::new(move |event: &SensorEvent| {
        let _ = tx.send(event.clone());
    }));

    let mut seen = 0;
    while seen < LIVE_READINGS {
        match rx.recv().await {
            Some(SensorEvent::Values { device_name, values }) => {
                seen += 1;
                println!(
                    "[{}] {}",
                    device_name.unwrap_or_default(),
                    format_values(&values)
                );
            }
            Some(SensorEvent::Error { error, .. }) => println!("Sensor error: {}", error),
            Some(SensorEvent::Connection {
                connected: false, ..
            })
            | None => break,
            Some(_) => {}
        }
    }
    sensor.remove_listener(listener);
}

async fn capture_time_series(registry: &SensorRegistry, config: &AppConfig, input: &mut Input) {
    let sensor = registry.get(&config.sensor);
    if !ensure_connected(&sensor, config, input).await {
        return;
    }

    let choices = sensor.selectable_sensors().await;
    for choice in &choices {
        println!(
            "  {}: {} [{}] {}..{}",
            choice.id, choice.info.name, choice.info.units, choice.info.min, choice.info.max
        );
    }
    let default_id = sensor.selected_sensor().await.unwrap_or_default();
    let mut id = prompt(input, &format!("Sub-sensor [default: {}]: ", default_id)).await;
    if id.is_empty() {
        id = default_id;
    }
    if let Err(e) = sensor.select_sensor(&id).await {
        println!("{}", e);
        return;
    }

    let secs = prompt(
        input,
        &format!("Capture seconds [default: {}]: ", DEFAULT_CAPTURE_SECS),
    )
    .await
    .parse::<u64>()
    .unwrap_or(DEFAULT_CAPTURE_SECS);

    let handle = match sensor
        .collect_time_series(
            config.time_series_period(),
            Some(&id),
            Box::new(|series: &TimeSeries| {
                if series.len() % 10 == 0 {
                    debug!("{} samples captured", series.len());
                }
            }),
        )
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            println!("Time series failed: {}", e);
            return;
        }
    };

    time::sleep(Duration::from_secs(secs)).await;
    handle.stop();
    let series = handle.snapshot();
    println!("Captured {} samples of {}", series.len(), series.info().name);

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    match export_time_series_csv(&series, &config.output_dir, &format!("{}_{}.csv", id, stamp)) {
        Ok(path) => println!("Saved {}", path.display()),
        Err(e) => error!("CSV export failed: {}", e),
    }
}
