// ── Per-device forwarding state ──
//
// A NodeState is one read-only snapshot of either the desired (configured)
// or the observed (operational) side of a device. It lives for the
// duration of a single reconciliation attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::group::{Group, GroupId};
use super::meter::{Meter, MeterId};
use super::object::{ForwardingObject, ObjectKind};
use super::table::Table;

/// All forwarding objects of one device, on one side of the diff.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeState {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

impl NodeState {
    pub fn groups_by_id(&self) -> HashMap<GroupId, Group> {
        self.groups.iter().map(|g| (g.id, g.clone())).collect()
    }

    pub fn meters_by_id(&self) -> HashMap<MeterId, &Meter> {
        self.meters.iter().map(|m| (m.id, m)).collect()
    }

    pub fn flow_count(&self) -> usize {
        self.tables.iter().map(|t| t.flows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.meters.is_empty() && self.flow_count() == 0
    }

    /// Objects of a single kind, flattened across tables.
    pub fn objects(&self, kind: ObjectKind) -> Vec<ForwardingObject> {
        match kind {
            ObjectKind::Flow => self
                .tables
                .iter()
                .flat_map(|t| t.flows.iter().cloned().map(ForwardingObject::Flow))
                .collect(),
            ObjectKind::Group => self.groups.iter().cloned().map(ForwardingObject::Group).collect(),
            ObjectKind::Meter => self.meters.iter().cloned().map(ForwardingObject::Meter).collect(),
            ObjectKind::TableFeatures => self
                .tables
                .iter()
                .flat_map(|t| t.features.iter().cloned().map(ForwardingObject::TableFeatures))
                .collect(),
        }
    }
}

/// Outcome of the device's most recent statistics-gathering round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStatus {
    pub succeeded: bool,
    pub completed_at: DateTime<Utc>,
}

impl SnapshotStatus {
    pub fn succeeded_at(completed_at: DateTime<Utc>) -> Self {
        Self {
            succeeded: true,
            completed_at,
        }
    }

    pub fn failed_at(completed_at: DateTime<Utc>) -> Self {
        Self {
            succeeded: false,
            completed_at,
        }
    }
}
