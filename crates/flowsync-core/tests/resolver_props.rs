// Ordering properties of group dependency resolution over generated group sets.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use common::{device, group};
use flowsync_core::reconcile::resolve_group_removals;
use flowsync_core::{Group, GroupId, ResolveOptions, resolve_groups};

// ── Strategies ──────────────────────────────────────────────────────

const INSTALLED_BASE: u32 = 100;

/// Installed groups plus an acyclic pending set in arbitrary order.
///
/// Pending group `n` references earlier pending groups or installed ones,
/// picked by the generated byte choices.
fn group_sets() -> impl Strategy<Value = (Vec<Group>, Vec<Group>)> {
    (
        0u32..4,
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..4), 1..14),
    )
        .prop_flat_map(|(installed_count, picks)| {
            let installed: Vec<Group> = (0..installed_count)
                .map(|i| group(INSTALLED_BASE + i, &[]))
                .collect();

            let pending: Vec<Group> = (1u32..)
                .zip(&picks)
                .map(|(id, choices)| {
                    let pool: Vec<u32> = (1..id)
                        .chain(INSTALLED_BASE..INSTALLED_BASE + installed_count)
                        .collect();
                    let refs: Vec<u32> = if pool.is_empty() {
                        Vec::new()
                    } else {
                        choices
                            .iter()
                            .map(|c| pool[usize::from(*c) % pool.len()])
                            .collect()
                    };
                    group(id, &refs)
                })
                .collect();

            (Just(installed), Just(pending).prop_shuffle())
        })
}

/// Acyclic redundant groups whose references may also point at ids the
/// device never reported.
fn redundant_sets() -> impl Strategy<Value = Vec<Group>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..4), 1..14).prop_flat_map(
        |picks| {
            let groups: Vec<Group> = (1u32..)
                .zip(&picks)
                .map(|(id, choices)| {
                    let refs: Vec<u32> = choices
                        .iter()
                        .map(|c| {
                            // Even picks hit an earlier redundant group, odd
                            // ones an unreported id.
                            if c % 2 == 0 && id > 1 {
                                1 + u32::from(*c) % (id - 1)
                            } else {
                                500 + u32::from(*c)
                            }
                        })
                        .collect();
                    group(id, &refs)
                })
                .collect();
            Just(groups).prop_shuffle()
        },
    )
}

fn by_id(groups: &[Group]) -> HashMap<GroupId, Group> {
    groups.iter().map(|g| (g.id, g.clone())).collect()
}

// ── Properties ──────────────────────────────────────────────────────

proptest! {
    /// Every reference of a phase-n push is installed or pushed before n,
    /// and every pending group is pushed exactly once.
    #[test]
    fn pushes_only_reference_earlier_phases((installed, pending) in group_sets()) {
        let installed_map = by_id(&installed);
        let phases = resolve_groups(
            &device(1),
            &installed_map,
            pending.clone(),
            ResolveOptions::default(),
        )
        .unwrap();

        let mut visible: HashSet<GroupId> = installed_map.keys().copied().collect();
        let mut pushed: Vec<GroupId> = Vec::new();
        for phase in &phases {
            prop_assert!(!phase.is_empty());
            for g in &phase.push {
                for target in g.referenced_groups() {
                    prop_assert!(
                        visible.contains(&target),
                        "group {} references {} before it is available",
                        g.id,
                        target
                    );
                }
            }
            pushed.extend(phase.push.iter().map(|g| g.id));
            visible.extend(phase.push.iter().map(|g| g.id));
        }

        pushed.sort_unstable();
        let mut expected: Vec<GroupId> = pending.iter().map(|g| g.id).collect();
        expected.sort_unstable();
        prop_assert_eq!(pushed, expected);
    }

    /// A redundant group is removed before every redundant group it
    /// references, and unreported targets never block a removal.
    #[test]
    fn removals_precede_their_redundant_targets(redundant in redundant_sets()) {
        let phases =
            resolve_group_removals(&device(1), &HashMap::new(), redundant.clone()).unwrap();

        let position: HashMap<GroupId, usize> = phases
            .iter()
            .enumerate()
            .flat_map(|(i, p)| p.push.iter().map(move |g| (g.id, i)))
            .collect();
        prop_assert_eq!(position.len(), redundant.len());

        for g in &redundant {
            for target in g.referenced_groups() {
                if let Some(target_phase) = position.get(&target) {
                    prop_assert!(position[&g.id] < *target_phase);
                }
            }
        }
    }
}
