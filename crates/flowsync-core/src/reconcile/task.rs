// ── Per-device reconciliation ──
//
// Kind order is fixed: table features, groups, meters, flows. Table
// features describe what the other objects may use; groups can be
// referenced by flows and other groups; meters by flows. The removal pass
// mirrors it: flows, meters, then groups.

use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use super::driver::PhasedSyncDriver;
use super::phase::Phase;
use super::plan::{RemovalPlan, plan_sync};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{DeviceId, NodeState};
use crate::service::{BundleId, DeviceService};

/// Lifecycle of a device's reconciliation as seen by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReconcileState {
    Idle,
    Active,
    Succeeded,
    Failed,
    Skipped,
}

/// Counters of one successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub written: usize,
    pub removed: usize,
}

/// How a reconciliation attempt ended.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Succeeded(SyncSummary),
    /// An upgrade bundle was loaded and awaits commit.
    Staged(BundleId),
    Failed(CoreError),
    /// Observed state could not be read; nothing was written. Carries
    /// `CoreError::ReadUnavailable`.
    Skipped(CoreError),
    /// The device disconnected while the attempt ran; its result was dropped.
    Discarded,
}

impl ReconcileOutcome {
    pub fn state(&self) -> ReconcileState {
        match self {
            Self::Succeeded(_) | Self::Staged(_) => ReconcileState::Succeeded,
            Self::Failed(_) => ReconcileState::Failed,
            Self::Skipped(_) => ReconcileState::Skipped,
            Self::Discarded => ReconcileState::Idle,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Staged(_))
    }
}

/// One reconciliation pass for one device.
pub struct DeviceReconciliationTask<'a, S: ?Sized> {
    service: &'a S,
    device: &'a DeviceId,
    config: &'a EngineConfig,
}

impl<'a, S: DeviceService + ?Sized> DeviceReconciliationTask<'a, S> {
    pub fn new(service: &'a S, device: &'a DeviceId, config: &'a EngineConfig) -> Self {
        Self {
            service,
            device,
            config,
        }
    }

    /// Run the pass. Missing observed state skips it.
    pub async fn run(&self, desired: &NodeState, observed: Option<&NodeState>) -> ReconcileOutcome {
        let Some(observed) = observed else {
            let reason = CoreError::ReadUnavailable {
                device: self.device.clone(),
            };
            info!(device = %self.device, reason = %reason, "skipping reconciliation");
            return ReconcileOutcome::Skipped(reason);
        };

        match self.sync(desired, observed).await {
            Ok(summary) => {
                info!(
                    device = %self.device,
                    written = summary.written,
                    removed = summary.removed,
                    "reconciliation succeeded"
                );
                ReconcileOutcome::Succeeded(summary)
            }
            Err(err) => {
                warn!(
                    device = %self.device,
                    error = %err,
                    causes = ?err.causes(),
                    "reconciliation failed"
                );
                ReconcileOutcome::Failed(err)
            }
        }
    }

    /// Diff, then apply every kind in order. Stops at the first failed phase.
    pub async fn sync(
        &self,
        desired: &NodeState,
        observed: &NodeState,
    ) -> Result<SyncSummary, CoreError> {
        let plan = plan_sync(
            self.device,
            desired,
            observed,
            self.config.gather_updates,
            self.config.remove_redundant,
        )?;
        debug!(
            device = %self.device,
            writes = plan.write_count(),
            removals = plan.removal_count(),
            "sync plan built"
        );

        let driver = PhasedSyncDriver::new(self.service, self.device);
        let mut summary = SyncSummary::default();

        summary.written += driver.apply("table-features", &plan.table_features).await?;
        summary.written += driver.apply("group", &plan.groups).await?;
        summary.written += driver.apply("meter", &plan.meters).await?;
        summary.written += driver.apply("flow", &plan.flows).await?;

        if let Some(removal) = &plan.removal {
            summary.removed = self.remove_redundant(&driver, removal).await?;
        }

        Ok(summary)
    }

    async fn remove_redundant(
        &self,
        driver: &PhasedSyncDriver<'_, S>,
        removal: &RemovalPlan,
    ) -> Result<usize, CoreError> {
        if removal.is_empty() {
            return Ok(0);
        }
        debug!(device = %self.device, "removing redundant objects");

        let mut removed = 0;
        removed += driver.remove("flow", &single_phase(&removal.flows)).await?;
        removed += driver.remove("meter", &single_phase(&removal.meters)).await?;
        removed += driver.remove("group", &removal.groups).await?;
        Ok(removed)
    }
}

fn single_phase<T: Clone>(items: &[T]) -> Vec<Phase<T>> {
    if items.is_empty() {
        Vec::new()
    } else {
        vec![Phase::push_only(items.to_vec())]
    }
}
