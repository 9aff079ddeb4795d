//! Domain types: steps, tasks, combos and the task registry

mod registry;
mod step;
mod task;

pub use registry::{TaskRegistry, TaskTable};
pub use step::{Step, StepKind, StepMode, deserialize_commands, deserialize_steps};
pub use task::{ComboDef, ComboMode, TaskDef};
