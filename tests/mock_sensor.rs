use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time;

use field_sensors::config::SensorConfig;
use field_sensors::error::SensorError;
use field_sensors::mock::{MockSensor, MockSensorOptions, MOCK_DEVICE_NAME};
use field_sensors::sensor::{
    Capability, CapabilitySet, ConnectOptions, ConnectionState, Sensor, SensorEvent,
    SensorRegistry,
};
use field_sensors::time_series::{TimeSeries, MAX_TIME_SERIES_SAMPLES};

const POLL: Duration = Duration::from_millis(50);

fn options() -> MockSensorOptions {
    let mut options = MockSensorOptions::default().with_seed(17);
    options.poll_interval = POLL;
    options
}

fn connected_options() -> MockSensorOptions {
    let mut options = options();
    options.auto_connect = true;
    options
}

#[tokio::test]
async fn connect_then_disconnect_round_trips_state() {
    let sensor = MockSensor::new(options());
    assert!(!sensor.is_connected());
    assert!(sensor.device_name().is_none());

    sensor.connect(ConnectOptions::default()).await.unwrap();
    assert!(sensor.is_connected());
    assert_eq!(sensor.device_name().as_deref(), Some(MOCK_DEVICE_NAME));
    assert!(sensor.values().values().all(|v| v.is_some()));

    sensor.disconnect().await;
    assert_eq!(sensor.state(), ConnectionState::Disconnected);
    assert!(sensor.device_name().is_none());
}

#[tokio::test]
async fn auto_connect_is_live_at_construction() {
    let sensor = MockSensor::new(connected_options());
    assert!(sensor.is_connected());
    let values = sensor.values();
    assert_eq!(values.len(), 3);
    assert!(values.values().all(|v| v.is_some()));
    sensor.disconnect().await;
}

#[test]
fn auto_connect_without_runtime_still_reports_values() {
    let sensor = MockSensor::new(connected_options());
    assert!(sensor.is_connected());
    assert!(!sensor.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn polled_values_stay_within_bounds() {
    let caps: CapabilitySet = [Capability::Temperature].into_iter().collect();
    let mut options = MockSensorOptions::new(caps)
        .with_range(Capability::Temperature, 20.0, 22.0)
        .with_increment(Capability::Temperature, 5.0)
        .with_seed(3);
    options.poll_interval = POLL;
    options.static_probability = 0.0;

    let sensor = MockSensor::new(options);
    let events = sensor.subscribe();
    sensor.connect(ConnectOptions::default()).await.unwrap();
    time::sleep(POLL * 100).await;
    sensor.disconnect().await;

    let readings: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            SensorEvent::Values { values, .. } => values[&Capability::Temperature],
            _ => None,
        })
        .collect();
    assert!(readings.len() > 50);
    assert!(readings.iter().all(|v| (20.0..=22.0).contains(v)));
}

#[tokio::test(start_paused = true)]
async fn degenerate_bounds_yield_exactly_ten() {
    let caps: CapabilitySet = [Capability::Temperature].into_iter().collect();
    let mut options =
        MockSensorOptions::new(caps).with_range(Capability::Temperature, 10.0, 10.0);
    options.poll_interval = POLL;

    let sensor = MockSensor::new(options);
    sensor.connect(ConnectOptions::default()).await.unwrap();
    for _ in 0..5 {
        assert_eq!(sensor.values()[&Capability::Temperature], Some(10.0));
        time::sleep(POLL).await;
    }
    sensor.disconnect().await;
}

#[tokio::test]
async fn disconnecting_a_never_connected_sensor_is_a_no_op() {
    let sensor = MockSensor::new(options());
    let events = sensor.subscribe();
    sensor.disconnect().await;
    assert_eq!(sensor.state(), ConnectionState::Disconnected);
    assert!(sensor.error().is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn error_latch_keeps_the_first_error() {
    let sensor = MockSensor::new(options());
    sensor.set_error(Some(SensorError::NotSetUp));
    sensor.set_error(Some(SensorError::NoCompatibleDevice));
    assert_eq!(sensor.error(), Some(SensorError::NotSetUp));

    sensor.set_error(None);
    sensor.set_error(Some(SensorError::NoCompatibleDevice));
    assert_eq!(sensor.error(), Some(SensorError::NoCompatibleDevice));
}

#[tokio::test]
async fn picker_selection_resolves_connect() {
    let mut options = options();
    options.show_device_picker = true;
    let sensor = Arc::new(MockSensor::new(options));

    let connecting = {
        let sensor = sensor.clone();
        tokio::spawn(async move { sensor.connect(ConnectOptions::default()).await })
    };

    let devices = sensor.devices_found().await;
    assert_eq!(devices.len(), 5);
    assert!(devices
        .iter()
        .all(|d| d.rssi.is_some_and(|r| (-100..-30).contains(&r))));
    assert!(sensor.pending_devices().is_some());

    sensor.select_device("mock-3").unwrap();
    connecting.await.unwrap().unwrap();

    assert!(sensor.is_connected());
    assert_eq!(sensor.device_name().as_deref(), Some("Mock Sensor 3"));
    assert!(sensor.pending_devices().is_none());
    sensor.disconnect().await;
}

#[tokio::test]
async fn picker_cancel_rejects_connect() {
    let mut options = options();
    options.show_device_picker = true;
    let sensor = Arc::new(MockSensor::new(options));
    let events = sensor.subscribe();

    let connecting = {
        let sensor = sensor.clone();
        tokio::spawn(async move { sensor.connect(ConnectOptions::default()).await })
    };
    sensor.devices_found().await;
    assert!(sensor.cancel_device_selection());

    assert_eq!(
        connecting.await.unwrap(),
        Err(SensorError::SelectionCancelled)
    );
    assert_eq!(sensor.state(), ConnectionState::Disconnected);
    assert_eq!(sensor.error(), Some(SensorError::SelectionCancelled));

    let seen: Vec<SensorEvent> = events.try_iter().collect();
    assert_eq!(seen.first(), Some(&SensorEvent::Connecting));
    assert!(seen.iter().any(|e| matches!(
        e,
        SensorEvent::Error {
            error: SensorError::SelectionCancelled,
            ..
        }
    )));
    assert_eq!(
        seen.last(),
        Some(&SensorEvent::Connection {
            connected: false,
            device_name: None
        })
    );
}

#[tokio::test]
async fn reconnect_replaces_the_binding() {
    let sensor = MockSensor::new(options());
    let events = sensor.subscribe();

    sensor.connect(ConnectOptions::default()).await.unwrap();
    sensor.connect(ConnectOptions::default()).await.unwrap();
    assert!(sensor.is_connected());

    let connections: Vec<bool> = events
        .try_iter()
        .filter_map(|e| match e {
            SensorEvent::Connection { connected, .. } => Some(connected),
            _ => None,
        })
        .collect();
    assert_eq!(connections, vec![true, false, true]);
    sensor.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn time_series_stops_at_the_sample_cap() {
    let sensor = MockSensor::new(connected_options());
    let lengths = Arc::new(Mutex::new(Vec::new()));
    let sink = lengths.clone();

    let handle = sensor
        .collect_time_series(
            Duration::from_millis(1),
            Some("force"),
            Box::new(move |series: &TimeSeries| sink.lock().push(series.len())),
        )
        .await
        .unwrap();

    time::sleep(Duration::from_secs(3)).await;

    let lengths = lengths.lock().clone();
    assert_eq!(lengths.len(), MAX_TIME_SERIES_SAMPLES);
    assert_eq!(lengths.last(), Some(&MAX_TIME_SERIES_SAMPLES));
    assert!(handle.is_finished());

    let series = handle.snapshot();
    assert!(series.values().all(|v| (0.0..=200.0).contains(&v)));
    assert_eq!(series.samples[999].time_ms, 999);
    sensor.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn no_callbacks_after_stop() {
    let sensor = MockSensor::new(connected_options());
    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();

    let handle = sensor
        .collect_time_series(
            Duration::from_millis(10),
            None,
            Box::new(move |_: &TimeSeries| *counter.lock() += 1),
        )
        .await
        .unwrap();

    time::sleep(Duration::from_millis(55)).await;
    handle.stop();
    let at_stop = *calls.lock();
    assert!(at_stop > 0);

    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(*calls.lock(), at_stop);
    sensor.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn switching_sub_sensor_keeps_capture_metadata() {
    let sensor = MockSensor::new(connected_options());
    assert_eq!(sensor.selected_sensor().await.as_deref(), Some("force"));
    let ids: Vec<String> = sensor
        .selectable_sensors()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["force", "temperature"]);

    let handle = sensor
        .collect_time_series(Duration::from_millis(10), None, Box::new(|_: &TimeSeries| {}))
        .await
        .unwrap();
    time::sleep(Duration::from_millis(30)).await;

    sensor.select_sensor("temperature").await.unwrap();
    time::sleep(Duration::from_millis(30)).await;
    handle.stop();

    let series = handle.snapshot();
    assert_eq!(series.info().name, "Force");
    assert_eq!(series.info().units, "N");
    let first = series.samples[0].info.as_ref().unwrap();
    assert_eq!(first.name, "Force");
    assert!(series.samples[1..].iter().all(|s| s.info.is_none()));
    assert!(matches!(
        sensor.select_sensor("pressure").await,
        Err(SensorError::UnknownSubSensor(_))
    ));
    sensor.disconnect().await;
}

#[tokio::test]
async fn time_series_requires_a_connection() {
    let sensor = MockSensor::new(options());
    let result = sensor
        .collect_time_series(Duration::from_millis(10), None, Box::new(|_: &TimeSeries| {}))
        .await;
    assert!(matches!(result, Err(SensorError::NotConnected)));
}

#[tokio::test]
async fn registry_reuses_and_evicts_sensors() {
    let registry = SensorRegistry::new(|config: &SensorConfig| {
        let mut options = MockSensorOptions::new(config.capabilities()).with_seed(5);
        options.poll_interval = POLL;
        Arc::new(MockSensor::new(options)) as Arc<dyn Sensor>
    });
    let config = SensorConfig::new(["temperature", "humidity"]);
    let reordered = SensorConfig::new(["humidity", "notes", "temperature"]);

    let first = registry.get(&config);
    assert!(Arc::ptr_eq(&first, &registry.get(&reordered)));
    assert_eq!(registry.len(), 1);

    first.connect(ConnectOptions::default()).await.unwrap();
    first.disconnect().await;
    assert!(!registry.contains(&config));

    let second = registry.get(&config);
    assert!(!Arc::ptr_eq(&first, &second));

    // a stale instance disconnecting again must not evict its replacement
    first.connect(ConnectOptions::default()).await.unwrap();
    first.disconnect().await;
    assert!(registry.contains(&config));

    registry.disconnect_all().await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn registry_keeps_a_sensor_that_reconnects() {
    let registry = SensorRegistry::new(|config: &SensorConfig| {
        let mut options = MockSensorOptions::new(config.capabilities()).with_seed(9);
        options.poll_interval = POLL;
        Arc::new(MockSensor::new(options)) as Arc<dyn Sensor>
    });
    let config = SensorConfig::new(["temperature"]);

    let sensor = registry.get(&config);
    sensor.connect(ConnectOptions::default()).await.unwrap();
    sensor.connect(ConnectOptions::default()).await.unwrap();

    assert!(sensor.is_connected());
    assert!(registry.contains(&config));
    let again = registry.get(&config);
    assert!(Arc::ptr_eq(&sensor, &again));
    assert!(again.is_connected());

    sensor.disconnect().await;
    assert!(!registry.contains(&config));
}
