// ── Southbound device service ──
//
// The engine's only path to a device. Implementations own encoding and
// transport; every call resolves once the device acknowledged (or
// rejected) the request.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::TransportError;
use crate::model::{DeviceId, ForwardingObject};

/// Identifier of a bundle transaction on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub u64);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bundle control request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BundleControl {
    Open,
    Close,
    Commit,
}

/// A message carried inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleMessage {
    Add(ForwardingObject),
    Remove(ForwardingObject),
}

/// Requests the engine sends to a device.
#[async_trait]
pub trait DeviceService: Send + Sync {
    async fn push(&self, device: &DeviceId, object: ForwardingObject) -> Result<(), TransportError>;

    async fn update(
        &self,
        device: &DeviceId,
        original: ForwardingObject,
        updated: ForwardingObject,
    ) -> Result<(), TransportError>;

    async fn remove(
        &self,
        device: &DeviceId,
        object: ForwardingObject,
    ) -> Result<(), TransportError>;

    /// Ask the device to finish every request sent before this one.
    async fn send_barrier(&self, device: &DeviceId) -> Result<(), TransportError>;

    async fn control_bundle(
        &self,
        device: &DeviceId,
        bundle: BundleId,
        control: BundleControl,
    ) -> Result<(), TransportError>;

    async fn add_bundle_messages(
        &self,
        device: &DeviceId,
        bundle: BundleId,
        messages: Vec<BundleMessage>,
    ) -> Result<(), TransportError>;
}
