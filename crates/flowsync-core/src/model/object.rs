// ── Forwarding objects ──
//
// The tagged union every southbound write goes through. Dispatch over the
// object kind is a `match`, never a trait object.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

use super::flow::Flow;
use super::group::Group;
use super::meter::Meter;
use super::table::TableFeatures;

/// Kind of forwarding object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Flow,
    Group,
    Meter,
    TableFeatures,
}

/// A single object written to (or removed from) a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "object")]
pub enum ForwardingObject {
    Flow(Flow),
    Group(Group),
    Meter(Meter),
    TableFeatures(TableFeatures),
}

impl ForwardingObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Flow(_) => ObjectKind::Flow,
            Self::Group(_) => ObjectKind::Group,
            Self::Meter(_) => ObjectKind::Meter,
            Self::TableFeatures(_) => ObjectKind::TableFeatures,
        }
    }
}

/// Human-readable identity, used in logs and failure reports.
impl fmt::Display for ForwardingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow(flow) => write!(f, "flow {}/{}", flow.table_id, flow.id),
            Self::Group(group) => write!(f, "group {}", group.id),
            Self::Meter(meter) => write!(f, "meter {}", meter.id),
            Self::TableFeatures(features) => write!(f, "table-features {}", features.table_id),
        }
    }
}

impl From<Flow> for ForwardingObject {
    fn from(flow: Flow) -> Self {
        Self::Flow(flow)
    }
}

impl From<Group> for ForwardingObject {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl From<Meter> for ForwardingObject {
    fn from(meter: Meter) -> Self {
        Self::Meter(meter)
    }
}

impl From<TableFeatures> for ForwardingObject {
    fn from(features: TableFeatures) -> Self {
        Self::TableFeatures(features)
    }
}
