//! discovery.rs
//! Pending device selection.
//!
//! When a scan yields candidates the user must choose from, `connect` parks in
//! `await_selection` holding the candidate list. The UI reads the list via
//! `pending` / `devices_found` and resolves it with `select(id)` or `cancel()`.
//! Starting a new selection cancels any previous one.

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use log::debug;

use crate::error::SensorError;
use crate::sensor::types::DiscoveredDevice;

enum Selection {
    Selected(DiscoveredDevice),
    Cancelled,
}

struct PendingSelection {
    candidates: Vec<DiscoveredDevice>,
    reply: oneshot::Sender<Selection>,
}

pub struct DeviceDiscovery {
    pending: Mutex<Option<PendingSelection>>,
    found: watch::Sender<Option<Vec<DiscoveredDevice>>>,
}

impl Default for DeviceDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDiscovery {
    pub fn new() -> Self {
        let (found, _) = watch::channel(None);
        Self {
            pending: Mutex::new(None),
            found,
        }
    }

    /// Publishes `candidates` and waits for `select` or `cancel`.
    pub async fn await_selection(
        &self,
        candidates: Vec<DiscoveredDevice>,
    ) -> Result<DiscoveredDevice, SensorError> {
        let (reply, choice) = oneshot::channel();
        let previous = self.pending.lock().replace(PendingSelection {
            candidates: candidates.clone(),
            reply,
        });
        if let Some(previous) = previous {
            let _ = previous.reply.send(Selection::Cancelled);
        }

        debug!("waiting for selection among {} devices", candidates.len());
        self.found.send_replace(Some(candidates));

        let outcome = choice.await;
        self.found.send_if_modified(|found| {
            // a newer selection may already have published its own list
            let stale = found.is_some() && self.pending.lock().is_none();
            if stale {
                *found = None;
            }
            stale
        });

        match outcome {
            Ok(Selection::Selected(device)) => Ok(device),
            Ok(Selection::Cancelled) | Err(_) => Err(SensorError::SelectionCancelled),
        }
    }

    /// Candidates of the selection currently waiting, if any.
    pub fn pending(&self) -> Option<Vec<DiscoveredDevice>> {
        self.pending.lock().as_ref().map(|p| p.candidates.clone())
    }

    /// Waits until a selection is pending and returns its candidates.
    pub async fn devices_found(&self) -> Vec<DiscoveredDevice> {
        let mut found = self.found.subscribe();
        loop {
            if let Some(candidates) = found.borrow_and_update().clone() {
                return candidates;
            }
            if found.changed().await.is_err() {
                return Vec::new();
            }
        }
    }

    pub fn select(&self, id: &str) -> Result<(), SensorError> {
        let mut pending = self.pending.lock();
        let device = pending
            .as_ref()
            .and_then(|p| p.candidates.iter().find(|d| d.id == id).cloned())
            .ok_or_else(|| SensorError::UnknownDevice(id.to_string()))?;

        if let Some(selection) = pending.take() {
            let _ = selection.reply.send(Selection::Selected(device));
        }
        Ok(())
    }

    /// Cancels the pending selection; false if none was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(selection) => {
                let _ = selection.reply.send(Selection::Cancelled);
                true
            }
            None => false,
        }
    }
}
