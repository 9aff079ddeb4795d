//! Step classification and execution-mode selection

use tracing::debug;

use crate::domain::{Step, StepKind, StepMode, TaskDef, TaskRegistry};

/// Separator between the parts of a step identifier
const STEP_ID_SEPARATOR: &str = "::";

/// Resolve a step's effective kind against the registry
///
/// `Auto` steps become `Task` when the trimmed value names a known task,
/// otherwise `Command`. Explicit kinds pass through unchanged.
pub fn classify(step: &Step, registry: &dyn TaskRegistry) -> (StepKind, String) {
    let value = step.value.trim().to_string();
    let kind = match step.kind {
        StepKind::Auto if registry.contains(&value) => StepKind::Task,
        StepKind::Auto => StepKind::Command,
        explicit => explicit,
    };
    (kind, value)
}

/// A task's execution plan: mode, step list and whether steps get identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    pub mode: StepMode,
    pub steps: Vec<Step>,
    pub multi: bool,
}

impl StepPlan {
    fn new(mode: StepMode, steps: &[Step], multi: bool) -> Self {
        Self {
            mode,
            steps: steps.to_vec(),
            multi,
        }
    }
}

/// Choose how a task runs
///
/// Precedence is `parallel`, then `seq`, then `cmd`. A lone `cmd` entry that
/// resolves to a task reference runs as a one-element sequence so it gets a
/// step identifier and step events.
pub fn select_mode(def: &TaskDef, registry: &dyn TaskRegistry) -> StepPlan {
    let plan = if !def.parallel.is_empty() {
        StepPlan::new(StepMode::Parallel, &def.parallel, true)
    } else if !def.seq.is_empty() {
        StepPlan::new(StepMode::Sequential, &def.seq, true)
    } else if def.cmd.is_empty() {
        StepPlan::new(StepMode::None, &[], false)
    } else if def.cmd.len() > 1 {
        StepPlan::new(StepMode::Sequential, &def.cmd, true)
    } else {
        match classify(&def.cmd[0], registry) {
            (StepKind::Task, _) => StepPlan::new(StepMode::Sequential, &def.cmd, true),
            _ => StepPlan::new(StepMode::None, &def.cmd, false),
        }
    };
    debug!(task = %def.name, mode = ?plan.mode, steps = plan.steps.len(), multi = plan.multi, "select_mode");
    plan
}

/// Build a step identifier: `<owner>::<tag>::<index>`
pub fn step_id(owner: &str, mode: StepMode, index: usize) -> String {
    format!("{owner}{STEP_ID_SEPARATOR}{}{STEP_ID_SEPARATOR}{index}", mode.tag())
}

/// Split a step identifier back into owner, mode and index
///
/// Task names may themselves contain the separator, so the tag and index are
/// taken from the right.
pub fn parse_step_id(id: &str) -> Option<(&str, StepMode, usize)> {
    let (rest, index) = id.rsplit_once(STEP_ID_SEPARATOR)?;
    let (owner, tag) = rest.rsplit_once(STEP_ID_SEPARATOR)?;
    if owner.is_empty() {
        return None;
    }
    let mode = StepMode::from_tag(tag)?;
    let index = index.parse().ok()?;
    Some((owner, mode, index))
}
