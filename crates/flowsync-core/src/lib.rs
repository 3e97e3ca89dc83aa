//! Reconciliation engine for flow-programmable switches.
//!
//! For every managed device the engine diffs the desired (configured)
//! forwarding state against what the device reports and drives the device
//! toward the desired state through ordered, dependency-aware,
//! barrier-synchronized writes:
//!
//! - **[`Engine`]**: Central facade. Device connect/disconnect and
//!   operational snapshot events start, discard, or retry per-device
//!   reconciliations on a bounded worker pool. Also exposes the
//!   administrative inspection surface, client flat batches
//!   ([`Engine::submit_flat_batch`]) and the upgrade switch
//!   ([`Engine::set_upgrade_state`]).
//!
//! - **Reconciliation** ([`reconcile`]): [`resolve_groups`] orders group
//!   writes into dependency-safe phases; [`PhasedSyncDriver`] applies
//!   phases with one barrier each and stops at the first failure;
//!   [`DeviceReconciliationTask`] runs table features, groups, meters and
//!   flows in that order, followed by the symmetric removal pass.
//!
//! - **Bookkeeping**: [`StateRegistry`] (three independent instances in
//!   [`Registries`]), [`SnapshotConsistencyGate`] and the per-device
//!   [`KeyedGuardPool`].
//!
//! - **Collaborators**: [`DeviceService`] carries requests to devices,
//!   [`StateStore`] supplies desired and observed snapshots.

pub mod batch;
pub mod bundle;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod service;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use batch::{BatchFailure, BatchItem, BatchStep, BatchStepType, FlatBatchResult};
pub use bundle::UpgradeBundleCoordinator;
pub use config::{BarrierPolicy, EngineConfig};
pub use engine::{CommitReport, Engine, UpgradeState, UpgradeTarget};
pub use error::{
    AggregatedError, BundleError, BundleStep, CoreError, DependencyError, TransportError,
};
pub use guard::{GuardHandle, KeyGuard, KeyedGuardPool};
pub use reconcile::{
    DeviceReconciliationTask, ItemUpdate, Phase, PhasedSyncDriver, ReconcileOutcome,
    ReconcileState, ResolveOptions, SyncPlan, SyncSummary, resolve_groups,
};
pub use registry::{Registries, SnapshotConsistencyGate, StateRegistry};
pub use service::{BundleControl, BundleId, BundleMessage, DeviceService};
pub use store::{MemoryStateStore, StateStore};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Action, Bucket, DeviceId, Flow, FlowId, FlowKey, ForwardingObject, Group, GroupId, GroupType,
    Instruction, Meter, MeterBand, MeterId, NodeState, ObjectKind, SnapshotStatus, Table,
    TableFeatures, TableId,
};
