// ── Runtime engine configuration ──
//
// These types describe *how* reconciliation runs. They never touch disk:
// `flowsync-config` (or any embedding application) builds an
// `EngineConfig` and hands it to the `Engine`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// When the flat batch planner inserts barriers between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BarrierPolicy {
    /// A barrier after every step.
    AfterEveryStep,
    /// A single barrier after the final step.
    AtEnd,
    /// A barrier only where the next step depends on what the previous
    /// steps wrote (e.g. flow add after group add).
    #[default]
    WhereNeeded,
}

/// Tuning knobs for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently running device reconciliations.
    pub worker_pool_size: usize,
    /// Plan differing objects that already exist on the device as updates.
    pub gather_updates: bool,
    /// Remove objects present on the device but absent from desired state.
    pub remove_redundant: bool,
    /// Barrier placement for client-submitted flat batches.
    pub batch_barrier_policy: BarrierPolicy,
    /// Abandon the remaining flat batch steps after the first failed one.
    pub exit_on_first_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            gather_updates: true,
            remove_redundant: true,
            batch_barrier_policy: BarrierPolicy::default(),
            exit_on_first_error: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn barrier_policy_parses_kebab_case() {
        assert_eq!(
            "after-every-step".parse::<BarrierPolicy>().unwrap(),
            BarrierPolicy::AfterEveryStep
        );
        assert_eq!(BarrierPolicy::WhereNeeded.to_string(), "where-needed");
        assert!("sometimes".parse::<BarrierPolicy>().is_err());
    }

    #[test]
    fn defaults_enable_updates_and_removal() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_pool_size, 4);
        assert!(config.gather_updates);
        assert!(config.remove_redundant);
        assert!(config.exit_on_first_error);
    }
}
