//! Read-only task lookup

use std::collections::HashMap;

use super::task::TaskDef;

/// Lookup capability for task definitions
///
/// Called repeatedly and recursively from concurrent workers, so
/// implementations must be pure reads.
pub trait TaskRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<TaskDef>;

    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// Task registry backed by a name-keyed map, built once from configuration
#[derive(Debug, Clone, Default)]
pub struct TaskTable {
    tasks: HashMap<String, TaskDef>,
}

impl TaskTable {
    pub fn new(tasks: impl IntoIterator<Item = TaskDef>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }
}

impl TaskRegistry for TaskTable {
    fn lookup(&self, name: &str) -> Option<TaskDef> {
        self.tasks.get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}
