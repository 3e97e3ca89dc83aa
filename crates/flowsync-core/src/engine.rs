// ── Reconciliation engine ──
//
// Lifecycle entry points for device connect/disconnect and operational
// snapshot events, the administrative inspection surface, client flat
// batches, and the upgrade bundle switch. Reconciliations run as tracked
// background tasks, bounded by a worker semaphore and serialized per
// device by the guard pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::batch::{self, BatchItem, FlatBatchResult};
use crate::bundle::UpgradeBundleCoordinator;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::guard::KeyedGuardPool;
use crate::model::{DeviceId, NodeState, SnapshotStatus};
use crate::reconcile::{DeviceReconciliationTask, ReconcileOutcome, ReconcileState};
use crate::registry::Registries;
use crate::service::{BundleId, DeviceService};
use crate::store::StateStore;

// ── Upgrade state ────────────────────────────────────────────────

/// Controller upgrade phase, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UpgradeState {
    #[default]
    Idle,
    /// Connecting devices are rebuilt through a pending bundle.
    InProgress,
    /// Pending bundles have been committed.
    Ended,
}

/// Which devices `finish_upgrade_reconciliation` commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeTarget {
    All,
    Device(DeviceId),
}

/// Result of committing one device's upgrade bundle.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub device: DeviceId,
    pub result: Result<BundleId, CoreError>,
}

// ── Engine ───────────────────────────────────────────────────────

/// The main entry point for collaborators.
///
/// Cheaply cloneable via `Arc<EngineInner>`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    service: Arc<dyn DeviceService>,
    store: Arc<dyn StateStore>,
    registries: Registries,
    guards: KeyedGuardPool<DeviceId>,
    workers: Semaphore,
    tasks: TaskTracker,
    states: DashMap<DeviceId, ReconcileState>,
    /// Connection generation of each active device. A pass only records its
    /// outcome while the generation it started under is still current.
    sessions: DashMap<DeviceId, u64>,
    next_session: AtomicU64,
    upgrade: watch::Sender<UpgradeState>,
    bundles: UpgradeBundleCoordinator,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn DeviceService>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let workers = Semaphore::new(config.worker_pool_size.max(1));
        let (upgrade, _) = watch::channel(UpgradeState::Idle);

        Self {
            inner: Arc::new(EngineInner {
                config,
                service,
                store,
                registries: Registries::new(),
                guards: KeyedGuardPool::new(),
                workers,
                tasks: TaskTracker::new(),
                states: DashMap::new(),
                sessions: DashMap::new(),
                next_session: AtomicU64::new(1),
                upgrade,
                bundles: UpgradeBundleCoordinator::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registries(&self) -> &Registries {
        &self.inner.registries
    }

    pub fn bundles(&self) -> &UpgradeBundleCoordinator {
        &self.inner.bundles
    }

    // ── Device lifecycle ─────────────────────────────────────────

    /// Start reconciling a newly connected device.
    ///
    /// `observed` is the operational snapshot delivered with the event; when
    /// absent it is read from the state store. A device that is already
    /// active is left alone and `None` returned.
    pub fn on_device_connected(
        &self,
        device: DeviceId,
        observed: Option<NodeState>,
    ) -> Option<JoinHandle<ReconcileOutcome>> {
        if self.inner.registries.reconcile.register_if_absent(&device).is_none() {
            debug!(device = %device, "device already active, ignoring connect");
            return None;
        }
        let session = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        self.inner.sessions.insert(device.clone(), session);
        info!(device = %device, session, "device connected");
        Some(self.spawn_reconciliation(device, session, observed))
    }

    /// Mark `device` inactive. A reconciliation still in flight finishes on
    /// its own and its result is discarded.
    pub fn on_device_disconnected(&self, device: &DeviceId) {
        self.inner.registries.forget(device);
        self.inner.sessions.remove(device);
        self.inner.states.remove(device);
        if let Some(bundle) = self.inner.bundles.forget(device) {
            debug!(device = %device, bundle_id = %bundle, "dropped pending upgrade bundle");
        }
        info!(device = %device, "device disconnected");
    }

    /// A new operational snapshot finished for `device`.
    ///
    /// Retries a failed reconciliation once the snapshot is newer than the
    /// failure.
    pub fn on_operational_snapshot(
        &self,
        device: &DeviceId,
        status: SnapshotStatus,
    ) -> Option<JoinHandle<ReconcileOutcome>> {
        let registries = &self.inner.registries;
        if !self.is_device_active(device) || !registries.retry.is_registered(device) {
            return None;
        }
        let session = self.current_session(device)?;
        if !registries.snapshot_gate().is_consistent(device, &status) {
            debug!(device = %device, "snapshot predates failure, retry deferred");
            return None;
        }

        registries.retry.unregister_if_registered(device);
        registries.snapshot_wait.unregister_if_registered(device);
        info!(device = %device, "retrying reconciliation on fresh snapshot");
        Some(self.spawn_reconciliation(device.clone(), session, None))
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn is_device_active(&self, device: &DeviceId) -> bool {
        self.inner.registries.reconcile.is_registered(device)
    }

    /// Whether a reconciliation (or batch) holds the device's guard.
    pub fn is_reconciling(&self, device: &DeviceId) -> bool {
        self.inner.guards.is_held(device)
    }

    pub fn device_state(&self, device: &DeviceId) -> ReconcileState {
        self.inner
            .states
            .get(device)
            .map_or(ReconcileState::Idle, |s| *s)
    }

    // ── Client batches ───────────────────────────────────────────

    /// Apply a client flat batch to an active device.
    pub async fn submit_flat_batch(
        &self,
        device: &DeviceId,
        items: Vec<BatchItem>,
    ) -> Result<FlatBatchResult, CoreError> {
        if !self.is_device_active(device) {
            return Err(CoreError::DeviceInactive {
                device: device.clone(),
            });
        }

        let config = &self.inner.config;
        let steps = batch::plan(items, config.batch_barrier_policy);
        let _guard = self.inner.guards.lock(device).await;
        let result = batch::execute(
            self.inner.service.as_ref(),
            device,
            &steps,
            config.exit_on_first_error,
        )
        .await;

        if !result.success {
            warn!(
                device = %device,
                failures = result.failures.len(),
                skipped = result.skipped,
                "flat batch failed"
            );
        }
        Ok(result)
    }

    // ── Upgrade ──────────────────────────────────────────────────

    pub fn upgrade_state(&self) -> UpgradeState {
        *self.inner.upgrade.borrow()
    }

    pub fn subscribe_upgrade_state(&self) -> watch::Receiver<UpgradeState> {
        self.inner.upgrade.subscribe()
    }

    /// Switch the upgrade phase. Moving to `Ended` commits every pending
    /// bundle and returns the per-device results.
    pub async fn set_upgrade_state(&self, state: UpgradeState) -> Vec<CommitReport> {
        let previous = self.inner.upgrade.send_replace(state);
        info!(from = %previous, to = %state, "upgrade state changed");

        if state == UpgradeState::Ended && previous != UpgradeState::Ended {
            return self
                .finish_upgrade_reconciliation(UpgradeTarget::All)
                .await
                .unwrap_or_default();
        }
        Vec::new()
    }

    /// Commit pending upgrade bundles.
    pub async fn finish_upgrade_reconciliation(
        &self,
        target: UpgradeTarget,
    ) -> Result<Vec<CommitReport>, CoreError> {
        if self.upgrade_state() == UpgradeState::Idle {
            return Err(CoreError::UpgradeNotInProgress);
        }

        let devices = match target {
            UpgradeTarget::All => self.inner.bundles.pending_devices(),
            UpgradeTarget::Device(device) => vec![device],
        };

        let commits = devices.into_iter().map(|device| async move {
            let _guard = self.inner.guards.lock(&device).await;
            let result = self
                .inner
                .bundles
                .commit(self.inner.service.as_ref(), &device)
                .await;
            if let Err(err) = &result {
                warn!(device = %device, error = %err, "upgrade bundle commit failed");
            }
            CommitReport { device, result }
        });
        Ok(join_all(commits).await)
    }

    /// Stop accepting work and wait for in-flight reconciliations.
    pub async fn shutdown(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        debug!("engine tasks drained");
    }

    // ── Private helpers ──────────────────────────────────────────

    fn current_session(&self, device: &DeviceId) -> Option<u64> {
        self.inner.sessions.get(device).map(|s| *s)
    }

    /// Whether `device` is still connected under `session`.
    fn is_current(&self, device: &DeviceId, session: u64) -> bool {
        self.is_device_active(device) && self.current_session(device) == Some(session)
    }

    fn spawn_reconciliation(
        &self,
        device: DeviceId,
        session: u64,
        observed: Option<NodeState>,
    ) -> JoinHandle<ReconcileOutcome> {
        self.inner.states.insert(device.clone(), ReconcileState::Active);
        let engine = self.clone();
        self.inner
            .tasks
            .spawn(async move { engine.reconcile_device(device, session, observed).await })
    }

    async fn reconcile_device(
        &self,
        device: DeviceId,
        session: u64,
        observed: Option<NodeState>,
    ) -> ReconcileOutcome {
        let inner = &self.inner;
        let Ok(_permit) = inner.workers.acquire().await else {
            return ReconcileOutcome::Failed(CoreError::Internal("worker pool closed".into()));
        };
        let _guard = inner.guards.lock(&device).await;

        if !self.is_current(&device, session) {
            debug!(device = %device, session, "device left before reconciliation started");
            return ReconcileOutcome::Discarded;
        }

        let outcome = if self.upgrade_state() == UpgradeState::InProgress {
            self.stage_upgrade_bundle(&device).await
        } else {
            let observed = match observed {
                Some(state) => Some(state),
                None => inner.store.read_observed(&device).await,
            };
            let desired = inner.store.read_desired(&device).await;
            DeviceReconciliationTask::new(inner.service.as_ref(), &device, &inner.config)
                .run(&desired, observed.as_ref())
                .await
        };

        self.record_outcome(&device, session, outcome)
    }

    async fn stage_upgrade_bundle(&self, device: &DeviceId) -> ReconcileOutcome {
        let inner = &self.inner;
        let desired = inner.store.read_desired(device).await;
        match inner
            .bundles
            .start(inner.service.as_ref(), device, &desired)
            .await
        {
            Ok(bundle) => ReconcileOutcome::Staged(bundle),
            Err(err) => {
                warn!(device = %device, error = %err, "upgrade bundle staging failed");
                ReconcileOutcome::Failed(err.into())
            }
        }
    }

    /// Apply an outcome to the registries, unless the session it ran under
    /// has ended.
    fn record_outcome(
        &self,
        device: &DeviceId,
        session: u64,
        outcome: ReconcileOutcome,
    ) -> ReconcileOutcome {
        let registries = &self.inner.registries;
        if !self.is_current(device, session) {
            if let ReconcileOutcome::Staged(bundle) = &outcome {
                if self.inner.bundles.active_bundle(device) == Some(*bundle) {
                    self.inner.bundles.forget(device);
                }
            }
            debug!(device = %device, session, "session ended, discarding reconciliation result");
            return ReconcileOutcome::Discarded;
        }

        match &outcome {
            ReconcileOutcome::Succeeded(_) | ReconcileOutcome::Staged(_) => {
                registries.retry.unregister_if_registered(device);
                registries.snapshot_wait.unregister_if_registered(device);
            }
            ReconcileOutcome::Failed(_) => {
                registries.retry.register(device);
                registries.snapshot_wait.register(device);
            }
            ReconcileOutcome::Skipped(_) | ReconcileOutcome::Discarded => {}
        }
        self.inner.states.insert(device.clone(), outcome.state());
        outcome
    }
}
