// ── Operational snapshot consistency ──

use std::sync::Arc;

use tracing::trace;

use super::StateRegistry;
use crate::model::{DeviceId, SnapshotStatus};

/// Decides whether an observed snapshot is fresh enough to diff against.
///
/// A snapshot requested before the registration that started the wait
/// (for example before a failed push) cannot reflect that event.
#[derive(Debug, Clone)]
pub struct SnapshotConsistencyGate {
    registry: Arc<StateRegistry>,
}

impl SnapshotConsistencyGate {
    pub fn new(registry: Arc<StateRegistry>) -> Self {
        Self { registry }
    }

    /// True when no wait is registered for `device`, or when `status`
    /// succeeded and completed strictly after the registration.
    pub fn is_consistent(&self, device: &DeviceId, status: &SnapshotStatus) -> bool {
        let Some(registered_at) = self.registry.registration(device) else {
            return true;
        };
        let consistent = status.succeeded && status.completed_at > registered_at;
        trace!(
            device = %device,
            registered_at = %registered_at,
            completed_at = %status.completed_at,
            succeeded = status.succeeded,
            consistent,
            "snapshot consistency check"
        );
        consistent
    }
}
