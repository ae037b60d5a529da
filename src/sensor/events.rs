//! events.rs
//! Typed publish/subscribe for sensor events.
//!
//! Two ways to listen: a callback registered with `add_listener` (removed by id),
//! or a crossbeam channel from `subscribe` (dropped receivers are pruned on the
//! next emit). Listeners run on the emitting task after internal locks are released,
//! so a listener may call back into the sensor.

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::sensor::types::SensorEvent;

pub type Listener = Arc<dyn Fn(&SensorEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    channels: Mutex<Vec<Sender<SensorEvent>>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SensorEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn subscribe(&self) -> Receiver<SensorEvent> {
        let (tx, rx) = unbounded();
        self.channels.lock().push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len() + self.channels.lock().len()
    }

    pub fn emit(&self, event: SensorEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }

        self.channels
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn removed_listener_stops_receiving() {
        let hub = EventHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = hub.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(SensorEvent::Connecting);
        assert!(hub.remove_listener(id));
        assert!(!hub.remove_listener(id));
        hub.emit(SensorEvent::Connecting);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        let kept = hub.subscribe();
        drop(rx);

        hub.emit(SensorEvent::Connection {
            connected: false,
            device_name: None,
        });

        assert_eq!(hub.listener_count(), 1);
        assert!(matches!(
            kept.try_recv(),
            Ok(SensorEvent::Connection { connected: false, .. })
        ));
    }

    #[test]
    fn listener_may_reenter_the_hub() {
        let hub = Arc::new(EventHub::new());
        let inner = hub.clone();
        hub.add_listener(move |_| {
            inner.add_listener(|_| {});
        });
        hub.emit(SensorEvent::Connecting);
        assert_eq!(hub.listener_count(), 2);
    }
}
