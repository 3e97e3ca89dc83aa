// ── Device registries ──
//
// Device-keyed presence tables with the time of registration. Three
// independent instances drive lifecycle bookkeeping: devices with a
// reconciliation pending or running, devices waiting to be retried, and
// devices waiting for an operational snapshot newer than their failure.

mod gate;

pub use gate::SnapshotConsistencyGate;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::model::DeviceId;

/// A concurrent `DeviceId -> registration time` map.
#[derive(Debug)]
pub struct StateRegistry {
    name: &'static str,
    entries: DashMap<DeviceId, DateTime<Utc>>,
}

impl StateRegistry {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    /// Register `device` now. Re-registering refreshes the stored time.
    pub fn register(&self, device: &DeviceId) -> DateTime<Utc> {
        let now = Utc::now();
        self.entries.insert(device.clone(), now);
        trace!(registry = self.name, device = %device, at = %now, "registered");
        now
    }

    /// Register `device` unless it already is. Returns the new registration
    /// time, or `None` if an earlier registration was kept.
    pub fn register_if_absent(&self, device: &DeviceId) -> Option<DateTime<Utc>> {
        match self.entries.entry(device.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let now = Utc::now();
                slot.insert(now);
                trace!(registry = self.name, device = %device, at = %now, "registered");
                Some(now)
            }
        }
    }

    pub fn is_registered(&self, device: &DeviceId) -> bool {
        self.entries.contains_key(device)
    }

    /// Time of the current registration, if any.
    pub fn registration(&self, device: &DeviceId) -> Option<DateTime<Utc>> {
        self.entries.get(device).map(|at| *at)
    }

    /// Remove `device`, returning the time it was registered at.
    ///
    /// Absence is not an error: the device is unregistered afterwards either way.
    pub fn unregister_if_registered(&self, device: &DeviceId) -> Option<DateTime<Utc>> {
        let removed = self.entries.remove(device).map(|(_, at)| at);
        if removed.is_some() {
            trace!(registry = self.name, device = %device, "unregistered");
        }
        removed
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three registries the engine keeps, each with its own storage.
#[derive(Debug)]
pub struct Registries {
    /// Devices that are connected and have a reconciliation pending or running.
    pub reconcile: Arc<StateRegistry>,
    /// Devices whose last reconciliation failed.
    pub retry: Arc<StateRegistry>,
    /// Devices waiting for a consistent operational snapshot.
    pub snapshot_wait: Arc<StateRegistry>,
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            reconcile: Arc::new(StateRegistry::new("reconcile")),
            retry: Arc::new(StateRegistry::new("retry")),
            snapshot_wait: Arc::new(StateRegistry::new("snapshot-wait")),
        }
    }
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate reading the snapshot-wait registry.
    pub fn snapshot_gate(&self) -> SnapshotConsistencyGate {
        SnapshotConsistencyGate::new(Arc::clone(&self.snapshot_wait))
    }

    /// Drop every registration of `device`.
    pub fn forget(&self, device: &DeviceId) {
        self.reconcile.unregister_if_registered(device);
        self.retry.unregister_if_registered(device);
        self.snapshot_wait.unregister_if_registered(device);
    }
}
