//! Controller configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Channel buffer size for controller requests
    #[serde(default = "default_inbox_buffer")]
    pub inbox_buffer: usize,

    /// Per-invocation event channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Max retained output lines per task and per step
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,
}

fn default_inbox_buffer() -> usize {
    debug!("default_inbox_buffer: called");
    1000
}

fn default_event_capacity() -> usize {
    debug!("default_event_capacity: called");
    DEFAULT_CHANNEL_CAPACITY
}

fn default_output_limit() -> usize {
    debug!("default_output_limit: called");
    10_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        debug!("ControllerConfig::default: called");
        Self {
            inbox_buffer: default_inbox_buffer(),
            event_capacity: default_event_capacity(),
            output_limit: default_output_limit(),
        }
    }
}
