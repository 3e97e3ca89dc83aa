// ── Meter domain types ──

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterId(pub u32);

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MeterBand {
    Drop { rate: u32, burst_size: u32 },
    DscpRemark { rate: u32, burst_size: u32, prec_level: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    pub id: MeterId,
    /// Rate in kb/s when false, packets/s when true.
    #[serde(default)]
    pub packet_rate: bool,
    #[serde(default)]
    pub bands: Vec<MeterBand>,
}

impl Meter {
    pub fn new(id: u32, bands: Vec<MeterBand>) -> Self {
        Self {
            id: MeterId(id),
            packet_rate: false,
            bands,
        }
    }
}
