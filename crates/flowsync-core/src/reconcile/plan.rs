// ── Desired vs. observed diffing ──
//
// Builds the complete plan for one device before anything is written, so a
// dependency dead-end in either the add or the removal direction aborts the
// pass with the device untouched.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::phase::{ItemUpdate, Phase, plan_size};
use super::resolver::{ResolveOptions, resolve_group_removals, resolve_groups};
use crate::error::DependencyError;
use crate::model::{DeviceId, Flow, FlowKey, Group, Meter, NodeState, TableFeatures, TableId};

/// Everything one reconciliation pass will write, in kind order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub table_features: Vec<Phase<TableFeatures>>,
    pub groups: Vec<Phase<Group>>,
    pub meters: Vec<Phase<Meter>>,
    pub flows: Vec<Phase<Flow>>,
    pub removal: Option<RemovalPlan>,
}

/// Objects on the device that desired state no longer mentions.
///
/// Applied flows first, then meters, then groups (in reverse dependency
/// order). Table features describe capabilities and are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub flows: Vec<Flow>,
    pub meters: Vec<Meter>,
    pub groups: Vec<Phase<Group>>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty() && self.meters.is_empty() && self.groups.is_empty()
    }
}

impl SyncPlan {
    /// Number of writes (pushes plus updates) in the add/update direction.
    pub fn write_count(&self) -> usize {
        plan_size(&self.table_features)
            + plan_size(&self.groups)
            + plan_size(&self.meters)
            + plan_size(&self.flows)
    }

    /// Number of removals.
    pub fn removal_count(&self) -> usize {
        self.removal
            .as_ref()
            .map_or(0, |r| r.flows.len() + r.meters.len() + plan_size(&r.groups))
    }

    pub fn is_empty(&self) -> bool {
        self.write_count() == 0 && self.removal_count() == 0
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "table-features", &self.table_features)?;
        write_section(f, "groups", &self.groups)?;
        write_section(f, "meters", &self.meters)?;
        write_section(f, "flows", &self.flows)?;
        match &self.removal {
            Some(removal) => write!(
                f,
                "remove: {} flow(s), {} meter(s), groups {}",
                removal.flows.len(),
                removal.meters.len(),
                phase_shape(&removal.groups)
            ),
            None => write!(f, "remove: disabled"),
        }
    }
}

fn write_section<T>(f: &mut fmt::Formatter<'_>, label: &str, phases: &[Phase<T>]) -> fmt::Result {
    writeln!(f, "{label}: {}", phase_shape(phases))
}

/// `[push+update, ...]` per phase, or `-` for no phases.
fn phase_shape<T>(phases: &[Phase<T>]) -> String {
    if phases.is_empty() {
        return "-".to_owned();
    }
    let parts: Vec<String> = phases
        .iter()
        .map(|p| format!("{}+{}", p.push.len(), p.update.len()))
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Diff `desired` against `observed` and produce the full plan.
pub fn plan_sync(
    device: &DeviceId,
    desired: &NodeState,
    observed: &NodeState,
    gather_updates: bool,
    remove_redundant: bool,
) -> Result<SyncPlan, DependencyError> {
    let groups = resolve_groups(
        device,
        &observed.groups_by_id(),
        desired.groups.iter().cloned(),
        ResolveOptions {
            gather_updates,
            include_updates_without_adds: true,
        },
    )?;

    let removal = if remove_redundant {
        Some(RemovalPlan {
            flows: redundant_flows(desired, observed),
            meters: redundant_meters(desired, observed),
            groups: resolve_group_removals(
                device,
                &desired.groups_by_id(),
                observed.groups.iter().cloned(),
            )?,
        })
    } else {
        None
    };

    Ok(SyncPlan {
        table_features: non_empty(table_feature_updates(desired, observed)),
        groups,
        meters: non_empty(meter_changes(desired, observed, gather_updates)),
        flows: non_empty(flow_changes(desired, observed, gather_updates)),
        removal,
    })
}

fn non_empty<T>(phase: Phase<T>) -> Vec<Phase<T>> {
    if phase.is_empty() { Vec::new() } else { vec![phase] }
}

/// One update per configured table whose features differ from the device.
///
/// When the device reports nothing for a table the desired record doubles
/// as the original.
pub fn table_feature_updates(desired: &NodeState, observed: &NodeState) -> Phase<TableFeatures> {
    let observed_features: HashMap<TableId, &TableFeatures> = observed
        .tables
        .iter()
        .flat_map(|t| t.features.iter())
        .map(|f| (f.table_id, f))
        .collect();

    let update = desired
        .tables
        .iter()
        .flat_map(|t| t.features.iter())
        .filter_map(|wanted| match observed_features.get(&wanted.table_id) {
            Some(current) if *current == wanted => None,
            Some(current) => Some(ItemUpdate::new((*current).clone(), wanted.clone())),
            None => Some(ItemUpdate::new(wanted.clone(), wanted.clone())),
        })
        .collect();

    Phase::new(Vec::new(), update)
}

/// Meters missing from the device, plus changed ones when `gather_updates`.
pub fn meter_changes(
    desired: &NodeState,
    observed: &NodeState,
    gather_updates: bool,
) -> Phase<Meter> {
    let current = observed.meters_by_id();
    let mut phase = Phase::default();

    for meter in &desired.meters {
        match current.get(&meter.id) {
            None => phase.push.push(meter.clone()),
            Some(existing) if gather_updates && *existing != meter => {
                phase.update.push(ItemUpdate::new((*existing).clone(), meter.clone()));
            }
            Some(_) => {}
        }
    }
    phase
}

/// Flows missing from the device, plus flows whose instructions changed
/// when `gather_updates`. Identity is `(table, flow id)`.
pub fn flow_changes(
    desired: &NodeState,
    observed: &NodeState,
    gather_updates: bool,
) -> Phase<Flow> {
    let current: HashMap<FlowKey, &Flow> = observed
        .tables
        .iter()
        .flat_map(|t| t.flows.iter())
        .map(|f| (f.key(), f))
        .collect();
    let mut phase = Phase::default();

    for flow in desired.tables.iter().flat_map(|t| t.flows.iter()) {
        match current.get(&flow.key()) {
            None => phase.push.push(flow.clone()),
            Some(existing) if gather_updates && existing.instructions != flow.instructions => {
                phase.update.push(ItemUpdate::new((*existing).clone(), flow.clone()));
            }
            Some(_) => {}
        }
    }
    phase
}

/// Flows on the device with no desired counterpart.
pub fn redundant_flows(desired: &NodeState, observed: &NodeState) -> Vec<Flow> {
    let wanted: HashSet<FlowKey> = desired
        .tables
        .iter()
        .flat_map(|t| t.flows.iter())
        .map(Flow::key)
        .collect();

    observed
        .tables
        .iter()
        .flat_map(|t| t.flows.iter())
        .filter(|f| !wanted.contains(&f.key()))
        .cloned()
        .collect()
}

/// Meters on the device with no desired counterpart.
pub fn redundant_meters(desired: &NodeState, observed: &NodeState) -> Vec<Meter> {
    let wanted = desired.meters_by_id();
    observed
        .meters
        .iter()
        .filter(|m| !wanted.contains_key(&m.id))
        .cloned()
        .collect()
}
