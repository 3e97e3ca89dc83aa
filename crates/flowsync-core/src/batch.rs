// ── Flat batch transactions ──
//
// Client-submitted add/remove/update lists over flows, groups and meters.
// Contiguous items of the same step type run as one concurrent step; steps
// run in order with barriers placed by policy. Failures are reported at
// the item's position in the caller's original flat list.

use futures_util::future::join_all;
use serde::Serialize;
use strum::Display;
use tracing::{debug, warn};

use crate::config::BarrierPolicy;
use crate::error::TransportError;
use crate::model::{DeviceId, Flow, ForwardingObject, Group, Meter};
use crate::service::DeviceService;

/// One element of a flat batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    AddFlow(Flow),
    RemoveFlow(Flow),
    UpdateFlow { original: Flow, updated: Flow },
    AddGroup(Group),
    RemoveGroup(Group),
    UpdateGroup { original: Group, updated: Group },
    AddMeter(Meter),
    RemoveMeter(Meter),
    UpdateMeter { original: Meter, updated: Meter },
}

/// `(kind, action)` of a batch item; the grouping key for steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStepType {
    FlowAdd,
    FlowRemove,
    FlowUpdate,
    GroupAdd,
    GroupRemove,
    GroupUpdate,
    MeterAdd,
    MeterRemove,
    MeterUpdate,
}

impl BatchItem {
    pub fn step_type(&self) -> BatchStepType {
        match self {
            Self::AddFlow(_) => BatchStepType::FlowAdd,
            Self::RemoveFlow(_) => BatchStepType::FlowRemove,
            Self::UpdateFlow { .. } => BatchStepType::FlowUpdate,
            Self::AddGroup(_) => BatchStepType::GroupAdd,
            Self::RemoveGroup(_) => BatchStepType::GroupRemove,
            Self::UpdateGroup { .. } => BatchStepType::GroupUpdate,
            Self::AddMeter(_) => BatchStepType::MeterAdd,
            Self::RemoveMeter(_) => BatchStepType::MeterRemove,
            Self::UpdateMeter { .. } => BatchStepType::MeterUpdate,
        }
    }

    /// The object the item targets (the new definition for updates).
    pub fn object(&self) -> ForwardingObject {
        match self {
            Self::AddFlow(f) | Self::RemoveFlow(f) | Self::UpdateFlow { updated: f, .. } => {
                ForwardingObject::Flow(f.clone())
            }
            Self::AddGroup(g) | Self::RemoveGroup(g) | Self::UpdateGroup { updated: g, .. } => {
                ForwardingObject::Group(g.clone())
            }
            Self::AddMeter(m) | Self::RemoveMeter(m) | Self::UpdateMeter { updated: m, .. } => {
                ForwardingObject::Meter(m.clone())
            }
        }
    }

    async fn send<S: DeviceService + ?Sized>(
        &self,
        service: &S,
        device: &DeviceId,
    ) -> Result<(), TransportError> {
        match self {
            Self::AddFlow(f) => service.push(device, f.clone().into()).await,
            Self::AddGroup(g) => service.push(device, g.clone().into()).await,
            Self::AddMeter(m) => service.push(device, m.clone().into()).await,
            Self::RemoveFlow(f) => service.remove(device, f.clone().into()).await,
            Self::RemoveGroup(g) => service.remove(device, g.clone().into()).await,
            Self::RemoveMeter(m) => service.remove(device, m.clone().into()).await,
            Self::UpdateFlow { original, updated } => {
                service
                    .update(device, original.clone().into(), updated.clone().into())
                    .await
            }
            Self::UpdateGroup { original, updated } => {
                service
                    .update(device, original.clone().into(), updated.clone().into())
                    .await
            }
            Self::UpdateMeter { original, updated } => {
                service
                    .update(device, original.clone().into(), updated.clone().into())
                    .await
            }
        }
    }
}

/// A maximal run of same-typed items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStep {
    pub step_type: BatchStepType,
    pub items: Vec<BatchItem>,
    pub barrier_after: bool,
}

/// One failed item, at its index in the submitted flat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub index: usize,
    pub step_type: BatchStepType,
    pub error: TransportError,
}

/// Outcome of a flat batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatBatchResult {
    pub success: bool,
    pub failures: Vec<BatchFailure>,
    /// Barriers that failed after an otherwise applied step.
    pub barrier_failures: Vec<TransportError>,
    /// Items never sent because an earlier step failed.
    pub skipped: usize,
}

impl FlatBatchResult {
    /// Human-readable causes, failed items first.
    pub fn causes(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("#{} {}: {}", f.index, f.step_type, f.error))
            .chain(self.barrier_failures.iter().map(|e| format!("barrier: {e}")))
            .collect()
    }
}

/// Group `items` into steps and place barriers according to `policy`.
pub fn plan(items: Vec<BatchItem>, policy: BarrierPolicy) -> Vec<BatchStep> {
    let mut steps: Vec<BatchStep> = Vec::new();

    for item in items {
        let step_type = item.step_type();
        match steps.last_mut() {
            Some(step) if step.step_type == step_type => step.items.push(item),
            _ => steps.push(BatchStep {
                step_type,
                items: vec![item],
                barrier_after: false,
            }),
        }
    }

    match policy {
        BarrierPolicy::AfterEveryStep => {
            for step in &mut steps {
                step.barrier_after = true;
            }
        }
        BarrierPolicy::AtEnd => {}
        BarrierPolicy::WhereNeeded => mark_barriers_where_needed(&mut steps),
    }
    if let Some(last) = steps.last_mut() {
        last.barrier_after = true;
    }

    steps
}

/// Put a barrier before any step that depends on a step type written since
/// the previous barrier.
fn mark_barriers_where_needed(steps: &mut [BatchStep]) {
    let mut since_barrier: Vec<BatchStepType> = Vec::new();
    let mut previous: Option<&mut BatchStep> = None;

    for step in steps.iter_mut() {
        if let Some(prev) = previous.take() {
            if needs_barrier(&since_barrier, step.step_type) {
                prev.barrier_after = true;
                since_barrier.clear();
            }
        }
        since_barrier.push(step.step_type);
        previous = Some(step);
    }
}

fn needs_barrier(previous: &[BatchStepType], next: BatchStepType) -> bool {
    use BatchStepType::{
        FlowAdd, FlowRemove, FlowUpdate, GroupAdd, GroupRemove, GroupUpdate, MeterAdd, MeterRemove,
    };
    let any = |types: &[BatchStepType]| previous.iter().any(|p| types.contains(p));

    match next {
        FlowAdd | FlowUpdate => any(&[GroupAdd, MeterAdd]),
        GroupAdd | GroupUpdate => any(&[GroupAdd, GroupUpdate]),
        GroupRemove => any(&[FlowRemove, FlowUpdate, GroupRemove, GroupUpdate]),
        MeterRemove => any(&[FlowRemove, FlowUpdate]),
        _ => false,
    }
}

/// Run `steps` in order against one device.
///
/// With `exit_on_first_error` the steps after a failed one are skipped;
/// otherwise every step runs and all failures are collected.
pub async fn execute<S: DeviceService + ?Sized>(
    service: &S,
    device: &DeviceId,
    steps: &[BatchStep],
    exit_on_first_error: bool,
) -> FlatBatchResult {
    let mut result = FlatBatchResult::default();
    let mut offset = 0usize;
    let mut aborted = false;

    for step in steps {
        if aborted {
            result.skipped += step.items.len();
            continue;
        }

        let outcomes = join_all(step.items.iter().map(|item| item.send(service, device))).await;
        let before = result.failures.len();
        for (local, outcome) in outcomes.into_iter().enumerate() {
            if let Err(error) = outcome {
                result.failures.push(BatchFailure {
                    index: offset + local,
                    step_type: step.step_type,
                    error,
                });
            }
        }
        let step_failed = result.failures.len() > before;
        debug!(
            device = %device,
            step = %step.step_type,
            offset,
            items = step.items.len(),
            failed = result.failures.len() - before,
            "batch step finished"
        );
        offset += step.items.len();

        if step_failed && exit_on_first_error {
            aborted = true;
            continue;
        }

        if step.barrier_after {
            if let Err(err) = service.send_barrier(device).await {
                warn!(
                    device = %device,
                    step = %step.step_type,
                    error = %err,
                    "batch barrier failed"
                );
                result.barrier_failures.push(err);
                if exit_on_first_error {
                    aborted = true;
                }
            }
        }
    }

    result.success = result.failures.is_empty() && result.barrier_failures.is_empty();
    result
}
