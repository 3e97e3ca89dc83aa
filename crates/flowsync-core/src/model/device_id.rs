// ── Device identity ──
//
// DeviceId is the key of every registry, guard, and bundle map. The
// datapath id is kept alongside the textual node id when it can be parsed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const OPENFLOW_PREFIX: &str = "openflow:";

/// Stable identifier of a managed switch (e.g. `openflow:1`).
///
/// Opaque to the engine: equality and hashing are over the full string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build the conventional `openflow:<dpid>` node id.
    pub fn from_datapath_id(dpid: u64) -> Self {
        Self(format!("{OPENFLOW_PREFIX}{dpid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Datapath id parsed from the trailing `:<number>` segment, if any.
    pub fn datapath_id(&self) -> Option<u64> {
        self.0.rsplit(':').next().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
