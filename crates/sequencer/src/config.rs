//! Engine settings.
//!
//! Embedded under the `engine` key of a run configuration; every field has a
//! default so the section may be omitted entirely.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grace period for outstanding step/measurement hooks before the final
    /// `sequence_complete` event; hooks still running afterwards are aborted
    #[serde(default = "default_hook_drain_timeout")]
    pub hook_drain_timeout_ms: u64,

    /// Default wait for an operator response to an input request
    #[serde(default = "default_input_timeout")]
    pub input_timeout_ms: u64,
}

fn default_hook_drain_timeout() -> u64 {
    5000 // 5 seconds
}

fn default_input_timeout() -> u64 {
    300_000 // 5 minutes
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hook_drain_timeout_ms: default_hook_drain_timeout(),
            input_timeout_ms: default_input_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn hook_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_drain_timeout_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn with_hook_drain_timeout(mut self, timeout: Duration) -> Self {
        self.hook_drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
