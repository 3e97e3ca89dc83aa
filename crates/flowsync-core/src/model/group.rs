// ── Group domain types ──

use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::Action;

/// Group table identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl GroupId {
    /// Wildcard used by delete-all group mods.
    pub const ALL: Self = Self(0xffff_fffc);
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    All,
    Select,
    Indirect,
    FastFailover,
}

/// One bucket of a group: an ordered action list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub weight: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_port: Option<u32>,
    pub actions: Vec<Action>,
}

impl Bucket {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            weight: 0,
            watch_port: None,
            actions,
        }
    }
}

/// A group definition: identity plus ordered buckets.
///
/// Two groups are considered identical only when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub group_type: GroupType,
    pub buckets: Vec<Bucket>,
}

impl Group {
    pub fn new(id: u32, group_type: GroupType, buckets: Vec<Bucket>) -> Self {
        Self {
            id: GroupId(id),
            group_type,
            buckets,
        }
    }

    /// Every group id referenced by a group action in any bucket.
    pub fn referenced_groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.buckets
            .iter()
            .flat_map(|b| b.actions.iter())
            .filter_map(Action::group_reference)
    }

    /// Delete-all group mod used by the upgrade bundle.
    pub fn delete_all() -> Self {
        Self {
            id: GroupId::ALL,
            group_type: GroupType::All,
            buckets: Vec::new(),
        }
    }
}
