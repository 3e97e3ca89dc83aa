// ── Flow entries ──

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::action::Instruction;
use super::table::TableId;

/// Configured flow identifier, unique within a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identity of a flow on a device: `(table, flow id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub table_id: TableId,
    pub flow_id: FlowId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub table_id: TableId,
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub cookie: u64,
    /// Match fields keyed by OXM field name.
    #[serde(default)]
    pub matches: BTreeMap<String, String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl Flow {
    pub fn new(table_id: u8, id: &str, instructions: Vec<Instruction>) -> Self {
        Self {
            id: FlowId::from(id),
            table_id: TableId(table_id),
            priority: 0,
            cookie: 0,
            matches: BTreeMap::new(),
            instructions,
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey {
            table_id: self.table_id,
            flow_id: self.id.clone(),
        }
    }

    /// Delete-all flow mod used by the upgrade bundle.
    pub fn delete_all() -> Self {
        Self {
            id: FlowId(String::new()),
            table_id: TableId::ALL,
            priority: 0,
            cookie: 0,
            matches: BTreeMap::new(),
            instructions: Vec::new(),
        }
    }
}
