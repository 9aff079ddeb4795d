//! Run event types
//!
//! The vocabulary an invocation uses to report progress to its consumer:
//! - Task lifecycle (started, finished)
//! - Step lifecycle (started, finished), addressed by step identifier
//! - Output lines, addressed by task name or step identifier

use crate::error::RunError;

/// Event emitted by the engine and the process launcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// A task invocation (outermost or nested) has started
    TaskStarted { task_name: String },

    /// One line of stdout or stderr
    OutputLine { source_id: String, line: String },

    /// A task invocation has finished
    TaskFinished {
        task_id: String,
        exit_code: i32,
        error: Option<RunError>,
        canceled: bool,
    },

    /// A step of a multi-step task has started
    StepStarted { step_id: String },

    /// A step of a multi-step task has finished
    StepFinished {
        step_id: String,
        exit_code: i32,
        error: Option<RunError>,
        canceled: bool,
    },
}

impl RunEvent {
    /// Task name or step identifier this event is addressed to
    pub fn source(&self) -> &str {
        match self {
            RunEvent::TaskStarted { task_name } => task_name,
            RunEvent::OutputLine { source_id, .. } => source_id,
            RunEvent::TaskFinished { task_id, .. } => task_id,
            RunEvent::StepStarted { step_id } | RunEvent::StepFinished { step_id, .. } => step_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::TaskStarted { .. } => "TaskStarted",
            RunEvent::OutputLine { .. } => "OutputLine",
            RunEvent::TaskFinished { .. } => "TaskFinished",
            RunEvent::StepStarted { .. } => "StepStarted",
            RunEvent::StepFinished { .. } => "StepFinished",
        }
    }

    /// Whether this event changes task or step status
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, RunEvent::OutputLine { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_and_type() {
        let event = RunEvent::OutputLine {
            source_id: "build::seq::0".to_string(),
            line: "ok".to_string(),
        };
        assert_eq!(event.source(), "build::seq::0");
        assert_eq!(event.event_type(), "OutputLine");
        assert!(!event.is_lifecycle());

        let event = RunEvent::TaskStarted {
            task_name: "build".to_string(),
        };
        assert_eq!(event.source(), "build");
        assert!(event.is_lifecycle());
    }
}
