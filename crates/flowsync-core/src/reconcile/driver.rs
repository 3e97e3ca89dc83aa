// ── Phased, barrier-flushed application ──
//
// Phases run strictly in order. Items inside a phase are sent concurrently
// and all awaited; any failure condenses into one `AggregatedError` and the
// remaining phases are never started. A successful phase is followed by one
// barrier so the next phase only starts once the device has applied it.

use futures_util::future::join_all;
use tracing::{debug, trace, warn};

use super::phase::Phase;
use crate::error::{AggregatedError, TransportError};
use crate::model::{DeviceId, ForwardingObject};
use crate::service::DeviceService;

/// What a driver run does with the `push` items of each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMode {
    /// Push new items, update changed ones.
    Write,
    /// Remove the items.
    Remove,
}

/// Applies phase plans to one device through a [`DeviceService`].
pub struct PhasedSyncDriver<'a, S: ?Sized> {
    service: &'a S,
    device: &'a DeviceId,
}

impl<'a, S: DeviceService + ?Sized> PhasedSyncDriver<'a, S> {
    pub fn new(service: &'a S, device: &'a DeviceId) -> Self {
        Self { service, device }
    }

    /// Push and update every phase in order. Returns the number of items written.
    pub async fn apply<T>(
        &self,
        label: &str,
        phases: &[Phase<T>],
    ) -> Result<usize, AggregatedError>
    where
        T: Clone + Into<ForwardingObject>,
    {
        self.run(label, phases, PhaseMode::Write).await
    }

    /// Remove the `push` items of every phase in order.
    pub async fn remove<T>(
        &self,
        label: &str,
        phases: &[Phase<T>],
    ) -> Result<usize, AggregatedError>
    where
        T: Clone + Into<ForwardingObject>,
    {
        self.run(label, phases, PhaseMode::Remove).await
    }

    async fn run<T>(
        &self,
        label: &str,
        phases: &[Phase<T>],
        mode: PhaseMode,
    ) -> Result<usize, AggregatedError>
    where
        T: Clone + Into<ForwardingObject>,
    {
        let mut written = 0usize;

        for (index, phase) in phases.iter().enumerate() {
            let errors = self.run_phase(phase, mode).await;
            if !errors.is_empty() {
                let context = match mode {
                    PhaseMode::Write => format!("{label} add/update"),
                    PhaseMode::Remove => format!("{label} remove"),
                };
                warn!(
                    device = %self.device,
                    phase = index,
                    failed = errors.len(),
                    "{context} failed"
                );
                return Err(AggregatedError::new(self.device, context, errors));
            }
            written += phase.len();

            if phase.barrier_after {
                self.barrier(label).await?;
            }
            debug!(
                device = %self.device,
                phase = index,
                items = phase.len(),
                "{label} phase applied"
            );
        }

        Ok(written)
    }

    async fn run_phase<T>(&self, phase: &Phase<T>, mode: PhaseMode) -> Vec<TransportError>
    where
        T: Clone + Into<ForwardingObject>,
    {
        let results = match mode {
            PhaseMode::Write => {
                let pushes = phase.push.iter().map(|item| {
                    let object: ForwardingObject = item.clone().into();
                    trace!(device = %self.device, %object, "push");
                    self.service.push(self.device, object)
                });
                let updates = phase.update.iter().map(|change| {
                    let original: ForwardingObject = change.original.clone().into();
                    let updated: ForwardingObject = change.updated.clone().into();
                    trace!(device = %self.device, object = %updated, "update");
                    self.service.update(self.device, original, updated)
                });
                join_all(pushes.chain(updates)).await
            }
            PhaseMode::Remove => {
                let removals = phase.push.iter().map(|item| {
                    let object: ForwardingObject = item.clone().into();
                    trace!(device = %self.device, %object, "remove");
                    self.service.remove(self.device, object)
                });
                join_all(removals).await
            }
        };

        results.into_iter().filter_map(Result::err).collect()
    }

    async fn barrier(&self, label: &str) -> Result<(), AggregatedError> {
        self.service.send_barrier(self.device).await.map_err(|err| {
            warn!(device = %self.device, error = %err, "{label} barrier failed");
            AggregatedError::new(self.device, format!("{label} barrier"), vec![err])
        })
    }
}
