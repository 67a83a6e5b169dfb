use serde::{Deserialize, Serialize};

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Call [`Strategy::next_open`](super::Strategy::next_open) before the
    /// broker settles each row. Pair with the broker's `coo` flag to fill
    /// market orders at the open of that row.
    pub cheat_on_open: bool,
    /// Consecutive polls in which no stream delivers or consumes input,
    /// while some stream is still waiting, after which the run stops.
    pub max_idle_polls: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cheat_on_open: false,
            max_idle_polls: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_idle_polls == 0 {
            return Err("max_idle_polls must be at least 1".into());
        }
        Ok(())
    }
}
