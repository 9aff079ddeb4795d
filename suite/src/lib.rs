//! Suite - interactive shell task runner
//!
//! Suite runs named shell tasks declared in a `.suite.yml`. A task is a
//! single command, a sequence, or a parallel group, and any step may name
//! another task, so tasks compose into graphs.
//!
//! # Core Concepts
//!
//! - **Steps resolve late**: a step that names a known task runs that task,
//!   anything else is a shell command
//! - **One event stream per invocation**: output lines and lifecycle
//!   transitions flow to a single consumer
//! - **Process trees die together**: canceling a task tears down every
//!   process it spawned
//! - **Combos**: named groups of tasks run sequentially or in parallel
//!
//! # Modules
//!
//! - [`domain`] - Task, step and combo definitions
//! - [`runner`] - Recursive engine and process launcher
//! - [`events`] - Run events and their channel
//! - [`combo`] - Combo scheduler
//! - [`controller`] - Status tables and the event consumer loop
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod combo;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod events;
pub mod init;
pub mod runner;

// Re-export commonly used types
pub use combo::{ComboScheduler, ComboUpdate, TaskStarter};
pub use config::Config;
pub use controller::{
    ConsoleReporter, ControlError, Controller, ControllerConfig, ControllerHandle, ControllerSnapshot, Reporter,
    SilentReporter, TaskSnapshot, TaskStatus,
};
pub use domain::{ComboDef, ComboMode, Step, StepKind, StepMode, TaskDef, TaskRegistry, TaskTable};
pub use error::{Outcome, RunError};
pub use events::{EventReceiver, EventSender, RunEvent, event_channel};
pub use runner::{ProcessLauncher, TaskEngine, build_shell_command, platform_killer};
