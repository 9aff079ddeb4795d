//! Combo scheduler
//!
//! State machine per in-flight combo, keyed by combo name. The scheduler
//! never runs anything itself: it asks a [`TaskStarter`] to start tasks and
//! is fed every task completion by the consumer loop.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::domain::{ComboDef, ComboMode};

/// Starts tasks on the scheduler's behalf
pub trait TaskStarter {
    /// Start `name` as part of a combo; false when it could not be started
    fn start_task(&mut self, name: &str) -> bool;
}

/// Something that happened to a combo while handling a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComboUpdate {
    /// Sequential combo moved on to its next task
    Advanced { combo: String, task: String },
    /// Every task ran (or every parallel task finished)
    Completed { combo: String },
    /// A task failed with stop-on-fail set; remaining tasks were skipped
    Aborted { combo: String, task: String },
}

#[derive(Debug)]
enum RunState {
    Parallel { pending: HashSet<String> },
    Sequential { index: usize, awaiting: Option<String> },
}

#[derive(Debug)]
struct ComboRun {
    def: ComboDef,
    state: RunState,
}

/// Tracks every combo currently in flight
#[derive(Debug, Default)]
pub struct ComboScheduler {
    active: HashMap<String, ComboRun>,
}

impl ComboScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a combo; returns whether it is now in flight
    ///
    /// A parallel combo where nothing could be started, or a combo with no
    /// tasks, completes immediately and returns false.
    pub fn trigger(&mut self, def: &ComboDef, starter: &mut dyn TaskStarter) -> bool {
        debug!(combo = %def.name, mode = %def.mode, "ComboScheduler::trigger: called");
        if self.active.contains_key(&def.name) {
            debug!(combo = %def.name, "ComboScheduler::trigger: already active");
            return false;
        }

        let state = match def.mode {
            ComboMode::Parallel => {
                let pending: HashSet<String> = def
                    .run
                    .iter()
                    .filter(|name| starter.start_task(name))
                    .cloned()
                    .collect();
                if pending.is_empty() {
                    info!(combo = %def.name, "Combo started no tasks");
                    return false;
                }
                RunState::Parallel { pending }
            }
            ComboMode::Sequential => {
                let Some(first) = def.run.first() else {
                    return false;
                };
                starter.start_task(first);
                RunState::Sequential {
                    index: 0,
                    awaiting: Some(first.clone()),
                }
            }
        };

        info!(combo = %def.name, mode = %def.mode, "Combo started");
        self.active.insert(
            def.name.clone(),
            ComboRun {
                def: def.clone(),
                state,
            },
        );
        true
    }

    /// Feed one task completion to every combo that might be waiting on it
    pub fn task_finished(&mut self, task: &str, failed: bool, starter: &mut dyn TaskStarter) -> Vec<ComboUpdate> {
        let mut updates = Vec::new();
        let mut done = Vec::new();

        for (name, run) in self.active.iter_mut() {
            match &mut run.state {
                RunState::Parallel { pending } => {
                    if pending.remove(task) && pending.is_empty() {
                        done.push(name.clone());
                        updates.push(ComboUpdate::Completed { combo: name.clone() });
                    }
                }
                RunState::Sequential { index, awaiting } => {
                    if awaiting.as_deref() != Some(task) {
                        continue;
                    }
                    if failed && run.def.stop_on_fail() {
                        done.push(name.clone());
                        updates.push(ComboUpdate::Aborted {
                            combo: name.clone(),
                            task: task.to_string(),
                        });
                        continue;
                    }
                    *index += 1;
                    match run.def.run.get(*index) {
                        Some(next) => {
                            // A task already running is awaited rather than restarted
                            starter.start_task(next);
                            *awaiting = Some(next.clone());
                            updates.push(ComboUpdate::Advanced {
                                combo: name.clone(),
                                task: next.clone(),
                            });
                        }
                        None => {
                            *awaiting = None;
                            done.push(name.clone());
                            updates.push(ComboUpdate::Completed { combo: name.clone() });
                        }
                    }
                }
            }
        }

        for name in done {
            self.active.remove(&name);
        }
        for update in &updates {
            debug!(?update, "ComboScheduler::task_finished: update");
        }
        updates
    }

    /// Whether `task` belongs to any active combo
    pub fn claims(&self, task: &str) -> bool {
        self.active.values().any(|run| run.def.includes(task))
    }

    pub fn is_active(&self, combo: &str) -> bool {
        self.active.contains_key(combo)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Names of active combos
    pub fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.keys().cloned().collect();
        names.sort();
        names
    }
}
