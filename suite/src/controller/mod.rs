//! Controller: the single consumer of run events
//!
//! The Controller owns the task and step status tables and is the only
//! driver of the combo scheduler. Callers talk to it through a
//! [`ControllerHandle`]:
//! - **Start / trigger:** run a task or a combo
//! - **Kill / restart:** cancel one invocation, optionally starting it again
//! - **Snapshot / wait-idle:** observe the tables

mod config;
mod core;
mod handle;
mod messages;
mod report;
mod state;

pub use config::ControllerConfig;
pub use core::Controller;
pub use handle::ControllerHandle;
pub use messages::{
    ControlError, ControlRequest, ControllerSnapshot, InvocationId, StepSnapshot, TaskSnapshot, TaskStatus,
};
pub use report::{ConsoleReporter, Reporter, SilentReporter};
