// ── Core error types ──
//
// Failures are values passed through the async chain. Per-item transport
// failures are condensed into an `AggregatedError` at phase granularity;
// nothing crosses a phase boundary as a panic.

use thiserror::Error;

use crate::model::{DeviceId, Group, GroupId};
use crate::reconcile::Phase;
use crate::service::BundleId;

/// Failure of a single southbound request (push, update, remove, barrier,
/// bundle control).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device {device} rejected {operation}: {message}")]
    Rejected {
        device: DeviceId,
        operation: String,
        message: String,
    },

    #[error("device {device} is not connected")]
    NotConnected { device: DeviceId },

    #[error("{operation} on device {device} timed out")]
    Timeout { device: DeviceId, operation: String },
}

impl TransportError {
    pub fn rejected(
        device: &DeviceId,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            device: device.clone(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// All failures of one phase (or one chained step), condensed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context} failed on {device} ({} error(s))", causes.len())]
pub struct AggregatedError {
    pub device: DeviceId,
    /// Which step failed, e.g. `"group add/update"` or `"barrier"`.
    pub context: String,
    pub causes: Vec<TransportError>,
}

impl AggregatedError {
    pub fn new(device: &DeviceId, context: impl Into<String>, causes: Vec<TransportError>) -> Self {
        Self {
            device: device.clone(),
            context: context.into(),
            causes,
        }
    }
}

/// Group references that cannot be satisfied (missing or cyclic).
///
/// `resolved` holds the phases built before the resolver got stuck. It is
/// diagnostic context only and must never be applied as a partial plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "failed to order groups for {device}: stuck at level {level} with {} unresolved group(s)",
    unresolved.len()
)]
pub struct DependencyError {
    pub device: DeviceId,
    pub level: usize,
    pub unresolved: Vec<GroupId>,
    pub resolved: Vec<Phase<Group>>,
}

/// Which step of the upgrade bundle protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BundleStep {
    Open,
    AddMessages,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bundle {bundle_id} {step} failed on {device}: {source}")]
pub struct BundleError {
    pub device: DeviceId,
    pub bundle_id: BundleId,
    pub step: BundleStep,
    #[source]
    pub source: TransportError,
}

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Planning ─────────────────────────────────────────────────────
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    // ── Device I/O ───────────────────────────────────────────────────
    #[error(transparent)]
    Aggregated(#[from] AggregatedError),

    #[error("observed state for {device} is not available")]
    ReadUnavailable { device: DeviceId },

    #[error("device {device} is not active")]
    DeviceInactive { device: DeviceId },

    // ── Upgrade bundles ──────────────────────────────────────────────
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("no active bundle for device {device}")]
    NoActiveBundle { device: DeviceId },

    #[error("upgrade is not in progress")]
    UpgradeNotInProgress,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transport-level causes, flattened, for structured reporting.
    pub fn causes(&self) -> Vec<String> {
        match self {
            Self::Aggregated(agg) => agg.causes.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}
