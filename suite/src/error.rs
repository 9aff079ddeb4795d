//! Run error types

use thiserror::Error;

/// Errors that terminate a single task or step invocation
///
/// These travel inside [`RunEvent`](crate::events::RunEvent)s, so they hold
/// rendered messages rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("no commands to run")]
    NoCommands,

    #[error("unknown task {0:?}")]
    UnknownTask(String),

    #[error("task cycle detected at {0:?}")]
    Cycle(String),

    #[error("empty step")]
    EmptyStep,

    #[error("unknown step kind")]
    UnknownStepKind,

    #[error("failed to start {shell}: {message}")]
    Spawn { shell: String, message: String },

    #[error("exit status {0}")]
    Exit(i32),

    #[error("terminated by signal")]
    Terminated,

    #[error("wait failed: {0}")]
    Wait(String),

    #[error("context canceled")]
    Canceled,

    #[error("step worker failed: {0}")]
    Worker(String),
}

/// Exit code and error observed at the end of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit_code: i32,
    pub error: Option<RunError>,
}

impl Outcome {
    /// A successful run
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            error: None,
        }
    }

    /// A failed run with a specific exit code
    pub fn failed(exit_code: i32, error: RunError) -> Self {
        Self {
            exit_code,
            error: Some(error),
        }
    }

    /// A run that failed before or outside of a process exit (exit code -1)
    pub fn error(error: RunError) -> Self {
        Self::failed(-1, error)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
