// ── Actions and instructions ──
//
// Shared by flow instructions and group buckets. Only the variants the
// engine needs to reason about are modelled structurally; everything else
// travels as an opaque set-field.

use serde::{Deserialize, Serialize};

use super::group::GroupId;
use super::meter::MeterId;
use super::table::TableId;

/// A single packet action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Output { port: u32 },
    /// Forward to another group. The referenced group must exist first.
    Group(GroupId),
    SetField { field: String, value: String },
    PushVlan { ethertype: u16 },
    PopVlan,
    SetQueue { queue_id: u32 },
    DecrementTtl,
}

impl Action {
    pub fn group_reference(&self) -> Option<GroupId> {
        match self {
            Self::Group(id) => Some(*id),
            _ => None,
        }
    }
}

/// A flow instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    ApplyActions(Vec<Action>),
    WriteActions(Vec<Action>),
    ClearActions,
    GotoTable(TableId),
    Meter(MeterId),
    WriteMetadata { metadata: u64, mask: u64 },
}
