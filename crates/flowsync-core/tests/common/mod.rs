// Shared fixtures for flowsync-core integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use flowsync_core::{
    Action, Bucket, BundleControl, BundleId, BundleMessage, DeviceId, DeviceService, Flow,
    ForwardingObject, Group, GroupId, GroupType, Instruction, Meter, MeterBand, TransportError,
};

// ── Recorded calls ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Push(String),
    Update(String),
    Remove(String),
    Barrier,
    Bundle(BundleControl),
    BundleMessages(usize),
}

// ── RecordingService ────────────────────────────────────────────────

/// Records every request and fails the ones it was told to.
#[derive(Default)]
pub struct RecordingService {
    calls: Mutex<Vec<(DeviceId, Call)>>,
    failing_objects: Mutex<HashSet<String>>,
    failing_controls: Mutex<HashSet<BundleControl>>,
    fail_barriers: Mutex<bool>,
    fail_bundle_messages: Mutex<bool>,
    /// When set, every push waits for a permit.
    push_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject any push/update/remove of the object with this display name
    /// (e.g. `"group 4"`).
    pub fn fail_object(&self, name: &str) {
        self.failing_objects.lock().unwrap().insert(name.to_owned());
    }

    pub fn clear_failures(&self) {
        self.failing_objects.lock().unwrap().clear();
        self.failing_controls.lock().unwrap().clear();
        *self.fail_barriers.lock().unwrap() = false;
        *self.fail_bundle_messages.lock().unwrap() = false;
    }

    pub fn fail_control(&self, control: BundleControl) {
        self.failing_controls.lock().unwrap().insert(control);
    }

    pub fn fail_barriers(&self) {
        *self.fail_barriers.lock().unwrap() = true;
    }

    pub fn fail_bundle_messages(&self) {
        *self.fail_bundle_messages.lock().unwrap() = true;
    }

    /// Block pushes until permits are added to the returned semaphore.
    pub fn hold_pushes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.push_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn calls_for(&self, device: &DeviceId) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn barrier_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Barrier).count()
    }

    /// Position of the first call equal to `call`.
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn record(&self, device: &DeviceId, call: Call) {
        self.calls.lock().unwrap().push((device.clone(), call));
    }

    fn check(&self, device: &DeviceId, object: &ForwardingObject) -> Result<(), TransportError> {
        let name = object.to_string();
        if self.failing_objects.lock().unwrap().contains(&name) {
            return Err(TransportError::rejected(device, name, "rejected by test"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceService for RecordingService {
    async fn push(
        &self,
        device: &DeviceId,
        object: ForwardingObject,
    ) -> Result<(), TransportError> {
        let gate = self.push_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.record(device, Call::Push(object.to_string()));
        self.check(device, &object)
    }

    async fn update(
        &self,
        device: &DeviceId,
        _original: ForwardingObject,
        updated: ForwardingObject,
    ) -> Result<(), TransportError> {
        self.record(device, Call::Update(updated.to_string()));
        self.check(device, &updated)
    }

    async fn remove(
        &self,
        device: &DeviceId,
        object: ForwardingObject,
    ) -> Result<(), TransportError> {
        self.record(device, Call::Remove(object.to_string()));
        self.check(device, &object)
    }

    async fn send_barrier(&self, device: &DeviceId) -> Result<(), TransportError> {
        self.record(device, Call::Barrier);
        if *self.fail_barriers.lock().unwrap() {
            return Err(TransportError::Timeout {
                device: device.clone(),
                operation: "barrier".into(),
            });
        }
        Ok(())
    }

    async fn control_bundle(
        &self,
        device: &DeviceId,
        _bundle: BundleId,
        control: BundleControl,
    ) -> Result<(), TransportError> {
        self.record(device, Call::Bundle(control));
        if self.failing_controls.lock().unwrap().contains(&control) {
            return Err(TransportError::rejected(device, control.to_string(), "bundle refused"));
        }
        Ok(())
    }

    async fn add_bundle_messages(
        &self,
        device: &DeviceId,
        _bundle: BundleId,
        messages: Vec<BundleMessage>,
    ) -> Result<(), TransportError> {
        self.record(device, Call::BundleMessages(messages.len()));
        if *self.fail_bundle_messages.lock().unwrap() {
            return Err(TransportError::rejected(device, "add bundle messages", "bundle full"));
        }
        Ok(())
    }
}

// ── Object builders ─────────────────────────────────────────────────

pub fn device(dpid: u64) -> DeviceId {
    DeviceId::from_datapath_id(dpid)
}

/// Group `id` whose single bucket references `refs`.
pub fn group(id: u32, refs: &[u32]) -> Group {
    let mut actions = vec![Action::Output { port: id }];
    actions.extend(refs.iter().map(|r| Action::Group(GroupId(*r))));
    Group::new(id, GroupType::Select, vec![Bucket::new(actions)])
}

pub fn flow(table: u8, id: &str, port: u32) -> Flow {
    Flow::new(
        table,
        id,
        vec![Instruction::ApplyActions(vec![Action::Output { port }])],
    )
}

pub fn meter(id: u32, rate: u32) -> Meter {
    Meter::new(id, vec![MeterBand::Drop { rate, burst_size: 64 }])
}

pub fn push(name: &str) -> Call {
    Call::Push(name.to_owned())
}

pub fn remove(name: &str) -> Call {
    Call::Remove(name.to_owned())
}

/// Poll `check` until it holds or a second elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
