//! Task execution: step resolution, the recursive engine, and the process
//! launcher with its platform-specific process-tree teardown

mod engine;
mod kill;
mod process;
mod resolver;
mod stack;

pub use engine::TaskEngine;
#[cfg(unix)]
pub use kill::ProcessGroupKiller;
pub use kill::{DEFAULT_KILL_GRACE, DirectKiller, ProcessKiller, descendants_from_table, platform_killer};
pub use process::{DEFAULT_SHELL, ProcessLauncher, build_shell_command};
pub use resolver::{StepPlan, classify, parse_step_id, select_mode, step_id};
pub use stack::ExecutionStack;
