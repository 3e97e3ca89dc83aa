// ── Domain model ──
//
// Forwarding objects as the engine sees them. Wire encoding is owned by
// the codec collaborator; these types only carry what diffing and
// dependency resolution need.

pub mod action;
pub mod device_id;
pub mod flow;
pub mod group;
pub mod meter;
pub mod node;
pub mod object;
pub mod table;

pub use action::{Action, Instruction};
pub use device_id::DeviceId;
pub use flow::{Flow, FlowId, FlowKey};
pub use group::{Bucket, Group, GroupId, GroupType};
pub use meter::{Meter, MeterBand, MeterId};
pub use node::{NodeState, SnapshotStatus};
pub use object::{ForwardingObject, ObjectKind};
pub use table::{Table, TableFeatures, TableId};
