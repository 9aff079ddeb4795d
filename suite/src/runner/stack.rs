//! Cycle-detection stack

use std::collections::HashSet;

/// Task names active along one execution path
///
/// Never shared between branches: every nested invocation and every parallel
/// branch gets its own copy via [`ExecutionStack::with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStack {
    active: HashSet<String>,
}

impl ExecutionStack {
    /// Stack for an outermost invocation of `name`
    pub fn root(name: &str) -> Self {
        Self::default().with(name)
    }

    /// Copy of this stack with `name` added
    pub fn with(&self, name: &str) -> Self {
        let mut active = self.active.clone();
        active.insert(name.to_string());
        Self { active }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.contains(name)
    }
}
