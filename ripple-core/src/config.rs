//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial document is enough:
///
/// ```rust
/// use ripple_core::RuntimeConfig;
///
/// let config: RuntimeConfig = serde_json::from_str(r#"{ "task_budget": 64 }"#).unwrap();
/// assert_eq!(config.task_budget, 64);
/// assert!(!config.trace_effects);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of tasks a single queue drain may run.
    ///
    /// Guards against effects whose schedulers keep queueing more work.
    pub task_budget: usize,

    /// Open a `tracing` span around every effect run.
    pub trace_effects: bool,
}

impl RuntimeConfig {
    pub const DEFAULT_TASK_BUDGET: usize = 100_000;

    pub fn with_task_budget(mut self, budget: usize) -> Self {
        self.task_budget = budget;
        self
    }

    pub fn with_effect_tracing(mut self, enabled: bool) -> Self {
        self.trace_effects = enabled;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_budget: Self::DEFAULT_TASK_BUDGET,
            trace_effects: false,
        }
    }
}
