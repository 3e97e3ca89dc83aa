// ── Flow tables and table features ──

use serde::{Deserialize, Serialize};
use std::fmt;

use super::flow::Flow;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TableId(pub u8);

impl TableId {
    /// Wildcard used by delete-all flow mods.
    pub const ALL: Self = Self(0xff);
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability description of one flow table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableFeatures {
    pub table_id: TableId,
    pub name: String,
    pub max_entries: u32,
    #[serde(default)]
    pub metadata_match: u64,
    #[serde(default)]
    pub metadata_write: u64,
    #[serde(default)]
    pub properties: Vec<String>,
}

/// A flow table as seen in desired or observed state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    #[serde(default)]
    pub features: Vec<TableFeatures>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Table {
    pub fn with_flows(id: u8, flows: Vec<Flow>) -> Self {
        Self {
            id: TableId(id),
            features: Vec::new(),
            flows,
        }
    }
}
