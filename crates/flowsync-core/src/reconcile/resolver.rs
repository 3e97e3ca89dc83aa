// ── Group dependency resolution ──
//
// Orders pending group writes so that no group reaches the device before
// every group it references. Each sweep over the pending set yields one
// phase; ids made eligible in a sweep only become visible to the next one,
// which keeps the partitioning independent of scan order within a sweep.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::phase::{ItemUpdate, Phase};
use crate::error::DependencyError;
use crate::model::{DeviceId, Group, GroupId};

/// Knobs for [`resolve_groups`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Plan groups already on the device with a different definition as
    /// updates. When false they are dropped like identical ones.
    pub gather_updates: bool,
    /// Keep a plan that consists only of updates. When false such a plan is
    /// suppressed and an empty list returned.
    pub include_updates_without_adds: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            gather_updates: true,
            include_updates_without_adds: true,
        }
    }
}

/// Split `pending` into dependency-safe phases against `installed`.
///
/// `installed` is the device's current group table keyed by id. Every
/// group-reference action of a phase-`n` item names a group that is either
/// in `installed` or pushed in a phase before `n`.
///
/// Returns [`DependencyError`] when a sweep makes no progress: some group
/// references an id that is neither installed nor pending, or the pending
/// references form a cycle. The phases built until then ride along in the
/// error for diagnostics only.
pub fn resolve_groups(
    device: &DeviceId,
    installed: &HashMap<GroupId, Group>,
    pending: impl IntoIterator<Item = Group>,
    options: ResolveOptions,
) -> Result<Vec<Phase<Group>>, DependencyError> {
    let installed_ids: HashSet<GroupId> = installed.keys().copied().collect();
    resolve_against(device, installed, installed_ids, pending.into_iter().collect(), options)
}

/// Sweep `pending` into phases. `installed_ids` is the set of reference
/// targets that count as present before the first phase.
fn resolve_against(
    device: &DeviceId,
    installed: &HashMap<GroupId, Group>,
    mut installed_ids: HashSet<GroupId>,
    mut pending: Vec<Group>,
    options: ResolveOptions,
) -> Result<Vec<Phase<Group>>, DependencyError> {
    let mut phases: Vec<Phase<Group>> = Vec::new();

    while !pending.is_empty() {
        let level = phases.len();
        let mut phase = Phase::default();
        let mut increment: Vec<GroupId> = Vec::new();
        let mut dropped = 0usize;

        pending.retain(|group| {
            let existing = installed.get(&group.id);

            if existing.is_some_and(|e| !options.gather_updates || e == group) {
                trace!(device = %device, group = %group.id, "group already installed, dropping");
                dropped += 1;
                return false;
            }

            let satisfied = group
                .referenced_groups()
                .all(|target| installed_ids.contains(&target));
            if !satisfied {
                return true;
            }

            match existing {
                Some(existing) => {
                    trace!(device = %device, group = %group.id, level, "group update");
                    phase.update.push(ItemUpdate::new(existing.clone(), group.clone()));
                }
                None => {
                    trace!(device = %device, group = %group.id, level, "group push");
                    phase.push.push(group.clone());
                    increment.push(group.id);
                }
            }
            false
        });

        if phase.is_empty() {
            if dropped > 0 {
                // Only no-ops were removed this sweep; rescan what is left.
                continue;
            }
            let mut unresolved: Vec<GroupId> = pending.iter().map(|g| g.id).collect();
            unresolved.sort_unstable();
            debug!(
                device = %device,
                level,
                unresolved = ?unresolved,
                "group dependencies cannot be satisfied"
            );
            return Err(DependencyError {
                device: device.clone(),
                level,
                unresolved,
                resolved: phases,
            });
        }

        debug!(
            device = %device,
            level,
            push = phase.push.len(),
            update = phase.update.len(),
            "group phase resolved"
        );
        installed_ids.extend(increment);
        phases.push(phase);
    }

    if !options.include_updates_without_adds && phases.iter().all(|p| p.push.is_empty()) {
        debug!(device = %device, "update-only group plan suppressed");
        return Ok(Vec::new());
    }

    Ok(phases)
}

/// Removal plan for groups present on the device but not desired.
///
/// Only references between redundant groups constrain the order: a target
/// that is not itself being removed never blocks a removal, even when the
/// device did not report it. The redundant groups are resolved with every
/// other target treated as present, then the phases are reversed so that
/// referencing groups go before the groups they reference.
pub fn resolve_group_removals(
    device: &DeviceId,
    desired: &HashMap<GroupId, Group>,
    observed: impl IntoIterator<Item = Group>,
) -> Result<Vec<Phase<Group>>, DependencyError> {
    let options = ResolveOptions {
        gather_updates: false,
        include_updates_without_adds: true,
    };
    let redundant: Vec<Group> = observed
        .into_iter()
        .filter(|g| !desired.contains_key(&g.id))
        .collect();
    let removing: HashSet<GroupId> = redundant.iter().map(|g| g.id).collect();
    let outside: HashSet<GroupId> = redundant
        .iter()
        .flat_map(Group::referenced_groups)
        .filter(|target| !removing.contains(target))
        .chain(desired.keys().copied())
        .collect();

    let mut phases = resolve_against(device, desired, outside, redundant, options)?;
    phases.reverse();
    Ok(phases)
}
