//! registry.rs
//! Application-owned cache of live sensors, keyed by config signature.
//!
//! A cached sensor is evicted as soon as it reports a disconnection, so the next
//! lookup for the same experiment builds a fresh sensor and rediscovers a device.
//! The disconnection a reconnect emits while replacing its binding does not count.

use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use log::{debug, info};

use crate::config::SensorConfig;
use crate::sensor::{types::SensorEvent, Sensor};

pub type SensorFactory = Box<dyn Fn(&SensorConfig) -> Arc<dyn Sensor> + Send + Sync>;

struct Entry {
    token: u64,
    sensor: Arc<dyn Sensor>,
}

pub struct SensorRegistry {
    sensors: Arc<DashMap<String, Entry>>,
    factory: SensorFactory,
    next_token: AtomicU64,
}

impl SensorRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&SensorConfig) -> Arc<dyn Sensor> + Send + Sync + 'static,
    {
        Self {
            sensors: Arc::new(DashMap::new()),
            factory: Box::new(factory),
            next_token: AtomicU64::new(0),
        }
    }

    /// The cached sensor for `config`, or a new one from the factory.
    pub fn get(&self, config: &SensorConfig) -> Arc<dyn Sensor> {
        let key = config.signature();

        let mut created = false;
        let (sensor, token) = {
            let entry = self.sensors.entry(key.clone()).or_insert_with(|| {
                created = true;
                Entry {
                    token: self.next_token.fetch_add(1, Ordering::Relaxed),
                    sensor: (self.factory)(config),
                }
            });
            (entry.sensor.clone(), entry.token)
        };

        // shard lock released; the listener may now remove entries
        if created {
            info!("registry: new sensor for {}", key);
            let sensors = Arc::downgrade(&self.sensors);
            let owner = Arc::downgrade(&sensor);
            sensor.add_listener(Box::new(move |event: &SensorEvent| {
                if let SensorEvent::Connection {
                    connected: false, ..
                } = event
                {
                    // a reconnect drops its old binding first; the sensor stays live
                    if owner.upgrade().is_some_and(|s| s.core().is_replacing()) {
                        return;
                    }
                    if let Some(sensors) = sensors.upgrade() {
                        if sensors.remove_if(&key, |_, e| e.token == token).is_some() {
                            debug!("registry: evicted {}", key);
                        }
                    }
                }
            }));
        }
        sensor
    }

    pub fn contains(&self, config: &SensorConfig) -> bool {
        self.sensors.contains_key(&config.signature())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Disconnects every cached sensor; each evicts itself on the way out.
    pub async fn disconnect_all(&self) {
        let sensors: Vec<Arc<dyn Sensor>> =
            self.sensors.iter().map(|e| e.sensor.clone()).collect();
        for sensor in sensors {
            sensor.disconnect().await;
        }
        self.sensors.clear();
    }
}
