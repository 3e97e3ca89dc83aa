// ── Upgrade bundles ──
//
// During a controller upgrade a device is cleared and rebuilt atomically:
// a bundle is opened, loaded with delete-all messages followed by the
// desired groups and flows, and left pending until the upgrade ends, when
// it is committed. Meters cannot travel in a bundle and are not touched by
// the delete-all messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{BundleError, BundleStep, CoreError};
use crate::model::{DeviceId, Flow, ForwardingObject, Group, NodeState, ObjectKind};
use crate::reconcile::{ResolveOptions, resolve_groups};
use crate::service::{BundleControl, BundleId, BundleMessage, DeviceService};

static NEXT_BUNDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks the pending upgrade bundle of each device.
#[derive(Debug, Default)]
pub struct UpgradeBundleCoordinator {
    active: DashMap<DeviceId, BundleId>,
}

impl UpgradeBundleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id from the process-wide counter.
    pub fn allocate_bundle_id() -> BundleId {
        BundleId(NEXT_BUNDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Open a bundle on `device` and load it with the clear-and-rebuild
    /// messages. The bundle is recorded only if loading succeeded.
    pub async fn start<S: DeviceService + ?Sized>(
        &self,
        service: &S,
        device: &DeviceId,
        desired: &NodeState,
    ) -> Result<BundleId, BundleError> {
        let bundle = Self::allocate_bundle_id();
        let fail = |step, source| BundleError {
            device: device.clone(),
            bundle_id: bundle,
            step,
            source,
        };

        // Nothing may be open; a failed close is expected then.
        if let Err(err) = service
            .control_bundle(device, bundle, BundleControl::Close)
            .await
        {
            debug!(
                device = %device,
                bundle_id = %bundle,
                error = %err,
                "close before open ignored"
            );
        }

        service
            .control_bundle(device, bundle, BundleControl::Open)
            .await
            .map_err(|e| fail(BundleStep::Open, e))?;

        let messages = rebuild_messages(device, desired);
        let count = messages.len();
        service
            .add_bundle_messages(device, bundle, messages)
            .await
            .map_err(|e| fail(BundleStep::AddMessages, e))?;

        if let Some(previous) = self.active.insert(device.clone(), bundle) {
            warn!(device = %device, previous = %previous, "replaced pending upgrade bundle");
        }
        info!(device = %device, bundle_id = %bundle, messages = count, "upgrade bundle staged");
        Ok(bundle)
    }

    /// Commit the pending bundle of `device`.
    ///
    /// The bundle is forgotten whatever the outcome; a failed commit is not
    /// retried.
    pub async fn commit<S: DeviceService + ?Sized>(
        &self,
        service: &S,
        device: &DeviceId,
    ) -> Result<BundleId, CoreError> {
        let Some((_, bundle)) = self.active.remove(device) else {
            return Err(CoreError::NoActiveBundle {
                device: device.clone(),
            });
        };

        service
            .control_bundle(device, bundle, BundleControl::Commit)
            .await
            .map_err(|source| BundleError {
                device: device.clone(),
                bundle_id: bundle,
                step: BundleStep::Commit,
                source,
            })?;

        info!(device = %device, bundle_id = %bundle, "upgrade bundle committed");
        Ok(bundle)
    }

    pub fn active_bundle(&self, device: &DeviceId) -> Option<BundleId> {
        self.active.get(device).map(|b| *b)
    }

    /// Devices with a pending bundle, in id order.
    pub fn pending_devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self.active.iter().map(|e| e.key().clone()).collect();
        devices.sort();
        devices
    }

    /// Drop the record for `device` without talking to it.
    pub fn forget(&self, device: &DeviceId) -> Option<BundleId> {
        self.active.remove(device).map(|(_, bundle)| bundle)
    }
}

/// Delete-all flows and groups, then the desired groups (referenced ones
/// first) and flows.
fn rebuild_messages(device: &DeviceId, desired: &NodeState) -> Vec<BundleMessage> {
    let mut messages = vec![
        BundleMessage::Remove(ForwardingObject::Flow(Flow::delete_all())),
        BundleMessage::Remove(ForwardingObject::Group(Group::delete_all())),
    ];

    let groups: Vec<Group> = match resolve_groups(
        device,
        &HashMap::new(),
        desired.groups.iter().cloned(),
        ResolveOptions::default(),
    ) {
        Ok(phases) => phases.into_iter().flat_map(|p| p.push).collect(),
        Err(err) => {
            warn!(device = %device, error = %err, "desired groups unordered in bundle");
            desired.groups.clone()
        }
    };
    messages.extend(groups.into_iter().map(|g| BundleMessage::Add(g.into())));
    messages.extend(
        desired
            .objects(ObjectKind::Flow)
            .into_iter()
            .map(BundleMessage::Add),
    );
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Bucket, GroupId, GroupType, Table, TableId};

    #[test]
    fn bundle_ids_increase() {
        let a = UpgradeBundleCoordinator::allocate_bundle_id();
        let b = UpgradeBundleCoordinator::allocate_bundle_id();
        assert!(b > a);
    }

    #[test]
    fn rebuild_starts_with_delete_all_then_ordered_groups() {
        let desired = NodeState {
            tables: vec![Table::with_flows(0, vec![Flow::new(0, "f", Vec::new())])],
            groups: vec![
                Group::new(
                    2,
                    GroupType::All,
                    vec![Bucket::new(vec![Action::Group(GroupId(1))])],
                ),
                Group::new(1, GroupType::All, Vec::new()),
            ],
            meters: Vec::new(),
        };

        let messages = rebuild_messages(&DeviceId::from("openflow:1"), &desired);

        assert_eq!(messages.len(), 5);
        match &messages[0] {
            BundleMessage::Remove(ForwardingObject::Flow(f)) => {
                assert_eq!(f.table_id, TableId::ALL);
            }
            other => panic!("unexpected first message {other:?}"),
        }
        match &messages[1] {
            BundleMessage::Remove(ForwardingObject::Group(g)) => assert_eq!(g.id, GroupId::ALL),
            other => panic!("unexpected second message {other:?}"),
        }
        let added: Vec<String> = messages[2..]
            .iter()
            .map(|m| match m {
                BundleMessage::Add(o) | BundleMessage::Remove(o) => o.to_string(),
            })
            .collect();
        assert_eq!(added, vec!["group 1", "group 2", "flow 0/f"]);
    }
}
