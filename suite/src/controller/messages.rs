//! Message and snapshot types for the Controller

use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::events::RunEvent;

/// Identifier of one outermost task invocation
pub type InvocationId = u64;

/// Why the controller refused a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("unknown task {0:?}")]
    UnknownTask(String),

    #[error("unknown combo {0:?}")]
    UnknownCombo(String),

    #[error("task {0:?} is already running")]
    TaskRunning(String),

    #[error("task {0:?} belongs to an active combo")]
    ClaimedByCombo(String),

    #[error("combo {0:?} is active or one of its tasks is running")]
    ComboDisabled(String),
}

/// Requests to the Controller task
#[derive(Debug)]
pub enum ControlRequest {
    /// Start a task by name
    StartTask {
        name: String,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Trigger a combo by name
    TriggerCombo {
        name: String,
        reply: oneshot::Sender<Result<(), ControlError>>,
    },

    /// Cancel a task's own invocation
    KillTask { name: String },

    /// Cancel and start again, or just start when idle
    RestartTask { name: String },

    /// Cancel every invocation
    KillAll,

    /// Get a copy of the status tables
    Snapshot { reply: oneshot::Sender<ControllerSnapshot> },

    /// Resolve once nothing is running
    WaitIdle { reply: oneshot::Sender<()> },

    /// Event forwarded from an invocation's channel
    Event { invocation: InvocationId, event: RunEvent },

    /// An invocation's channel has closed
    StreamClosed { invocation: InvocationId },

    /// Stop the controller
    Shutdown,
}

/// Task or step status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Status after a finished event
    pub fn finished(failed: bool, canceled: bool) -> Self {
        if canceled {
            TaskStatus::Canceled
        } else if failed {
            TaskStatus::Failed
        } else {
            TaskStatus::Success
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        write!(f, "{label}")
    }
}

/// One step row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSnapshot {
    pub id: String,
    pub label: String,
    pub status: TaskStatus,
    pub exit_code: i32,
    pub output: Vec<String>,
}

/// One task row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub name: String,
    pub status: TaskStatus,
    pub exit_code: i32,
    pub error: Option<String>,
    pub output: Vec<String>,
    pub steps: Vec<StepSnapshot>,
}

/// Point-in-time copy of the controller's tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub tasks: Vec<TaskSnapshot>,
    pub active_combos: Vec<String>,
    pub invocations: usize,
}

impl ControllerSnapshot {
    pub fn task(&self, name: &str) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn is_idle(&self) -> bool {
        self.invocations == 0 && self.active_combos.is_empty()
    }
}
