// ── Desired / observed state access ──
//
// The persisted data store is a collaborator. The engine only reads
// per-device snapshots through `StateStore`; `MemoryStateStore` is the
// in-process implementation used by embedders without a database and by
// the tests.

mod memory;

pub use memory::MemoryStateStore;

use async_trait::async_trait;

use crate::model::{DeviceId, NodeState};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Configured state of `device`. Empty when nothing is configured.
    async fn read_desired(&self, device: &DeviceId) -> NodeState;

    /// Operational state of `device`, or `None` when it cannot be read.
    async fn read_observed(&self, device: &DeviceId) -> Option<NodeState>;
}
