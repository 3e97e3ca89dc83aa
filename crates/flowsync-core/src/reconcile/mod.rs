// ── Reconciliation ──
//
// Diffing, dependency ordering and phased application for one device.

mod driver;
mod phase;
mod plan;
mod resolver;
mod task;

pub use driver::{PhaseMode, PhasedSyncDriver};
pub use phase::{ItemUpdate, Phase, plan_size};
pub use plan::{
    RemovalPlan, SyncPlan, flow_changes, meter_changes, plan_sync, redundant_flows,
    redundant_meters, table_feature_updates,
};
pub use resolver::{ResolveOptions, resolve_group_removals, resolve_groups};
pub use task::{DeviceReconciliationTask, ReconcileOutcome, ReconcileState, SyncSummary};
