// ── In-memory state store ──
//
// Two `DashMap`s of shared snapshots plus a `watch` version counter bumped
// on every mutation, so embedders can react to configuration changes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;

use super::StateStore;
use crate::model::{DeviceId, NodeState};

pub struct MemoryStateStore {
    desired: DashMap<DeviceId, Arc<NodeState>>,
    observed: DashMap<DeviceId, Arc<NodeState>>,
    version: watch::Sender<u64>,
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            desired: DashMap::new(),
            observed: DashMap::new(),
            version,
        }
    }

    pub fn set_desired(&self, device: &DeviceId, state: NodeState) {
        self.desired.insert(device.clone(), Arc::new(state));
        self.bump_version();
    }

    pub fn set_observed(&self, device: &DeviceId, state: NodeState) {
        self.observed.insert(device.clone(), Arc::new(state));
        self.bump_version();
    }

    /// Forget the operational snapshot, making it unavailable.
    pub fn clear_observed(&self, device: &DeviceId) {
        if self.observed.remove(device).is_some() {
            self.bump_version();
        }
    }

    pub fn desired(&self, device: &DeviceId) -> Option<Arc<NodeState>> {
        self.desired.get(device).map(|r| Arc::clone(r.value()))
    }

    pub fn observed(&self, device: &DeviceId) -> Option<Arc<NodeState>> {
        self.observed.get(device).map(|r| Arc::clone(r.value()))
    }

    /// Subscribe to the mutation counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    fn bump_version(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v += 1);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_desired(&self, device: &DeviceId) -> NodeState {
        self.desired(device)
            .map(|state| state.as_ref().clone())
            .unwrap_or_default()
    }

    async fn read_observed(&self, device: &DeviceId) -> Option<NodeState> {
        self.observed(device).map(|state| state.as_ref().clone())
    }
}
