// ── Installation phases ──

/// A changed item: what the device has and what it should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate<T> {
    pub original: T,
    pub updated: T,
}

impl<T> ItemUpdate<T> {
    pub fn new(original: T, updated: T) -> Self {
        Self { original, updated }
    }
}

/// One ordered step of a reconciliation plan.
///
/// Items inside a phase have no ordering between them and may be written
/// concurrently. Phases are consumed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase<T> {
    pub push: Vec<T>,
    pub update: Vec<ItemUpdate<T>>,
    pub barrier_after: bool,
}

impl<T> Default for Phase<T> {
    fn default() -> Self {
        Self {
            push: Vec::new(),
            update: Vec::new(),
            barrier_after: true,
        }
    }
}

impl<T> Phase<T> {
    pub fn new(push: Vec<T>, update: Vec<ItemUpdate<T>>) -> Self {
        Self {
            push,
            update,
            barrier_after: true,
        }
    }

    pub fn push_only(push: Vec<T>) -> Self {
        Self::new(push, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.push.len() + self.update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.push.is_empty() && self.update.is_empty()
    }
}

/// Total item count across a plan.
pub fn plan_size<T>(phases: &[Phase<T>]) -> usize {
    phases.iter().map(Phase::len).sum()
}
