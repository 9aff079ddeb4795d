//! Task and step status tables owned by the controller loop

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::messages::{ControlError, ControlRequest, ControllerSnapshot, InvocationId, StepSnapshot, TaskSnapshot, TaskStatus};
use super::report::Reporter;
use crate::combo::TaskStarter;
use crate::domain::{StepKind, TaskDef};
use crate::error::RunError;
use crate::events::{RunEvent, event_channel};
use crate::runner::{TaskEngine, classify, parse_step_id, select_mode, step_id};

/// Bounded line buffer; the oldest lines fall off first
#[derive(Debug, Clone)]
struct OutputBuffer {
    lines: VecDeque<String>,
    limit: usize,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Where a step's output lands in its owner task's buffer
#[derive(Debug, Clone)]
struct StepTarget {
    prefix: String,
    child_task: bool,
}

#[derive(Debug)]
struct TaskRow {
    def: TaskDef,
    status: TaskStatus,
    exit_code: i32,
    error: Option<RunError>,
    running: bool,
    /// Outermost invocation started for this task, if any
    invocation: Option<InvocationId>,
    output: OutputBuffer,
    steps: Vec<String>,
    /// Keyed by step id for commands, by child task name for task references
    targets: HashMap<String, StepTarget>,
}

impl TaskRow {
    fn reset(&mut self) {
        self.status = TaskStatus::Idle;
        self.exit_code = 0;
        self.error = None;
        self.running = false;
    }

    fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.exit_code = 0;
        self.error = None;
        self.running = true;
        self.output.clear();
    }
}

#[derive(Debug)]
struct StepRow {
    owner: String,
    label: String,
    prefix: String,
    status: TaskStatus,
    exit_code: i32,
    output: OutputBuffer,
}

impl StepRow {
    fn reset(&mut self) {
        self.status = TaskStatus::Idle;
        self.exit_code = 0;
        self.output.clear();
    }
}

struct Invocation {
    task: String,
    token: CancellationToken,
}

/// A task finished; fed to the combo scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FinishedTask {
    pub task: String,
    pub failed: bool,
    pub outermost: bool,
}

pub(crate) struct TaskBoard {
    tasks: HashMap<String, TaskRow>,
    order: Vec<String>,
    steps: HashMap<String, StepRow>,
    invocations: HashMap<InvocationId, Invocation>,
    next_invocation: InvocationId,
    engine: TaskEngine,
    inbox: mpsc::Sender<ControlRequest>,
    reporter: Arc<dyn Reporter>,
    event_capacity: usize,
    output_limit: usize,
}

impl TaskBoard {
    pub fn new(
        engine: TaskEngine,
        tasks: Vec<TaskDef>,
        inbox: mpsc::Sender<ControlRequest>,
        reporter: Arc<dyn Reporter>,
        event_capacity: usize,
        output_limit: usize,
    ) -> Self {
        let order = tasks.iter().map(|t| t.name.clone()).collect();
        let tasks = tasks
            .into_iter()
            .map(|def| {
                let row = TaskRow {
                    def,
                    status: TaskStatus::Idle,
                    exit_code: 0,
                    error: None,
                    running: false,
                    invocation: None,
                    output: OutputBuffer::new(output_limit),
                    steps: Vec::new(),
                    targets: HashMap::new(),
                };
                (row.def.name.clone(), row)
            })
            .collect();
        Self {
            tasks,
            order,
            steps: HashMap::new(),
            invocations: HashMap::new(),
            next_invocation: 1,
            engine,
            inbox,
            reporter,
            event_capacity,
            output_limit,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.get(name).is_some_and(|row| row.running)
    }

    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }

    /// Start an outermost invocation of `name`
    pub fn start(&mut self, name: &str) -> Result<(), ControlError> {
        let row = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| ControlError::UnknownTask(name.to_string()))?;
        if row.running {
            return Err(ControlError::TaskRunning(name.to_string()));
        }

        let id = self.next_invocation;
        self.next_invocation += 1;
        let token = CancellationToken::new();

        row.mark_running();
        row.invocation = Some(id);
        let def = row.def.clone();

        self.prepare_steps(name);
        self.reset_children(name);
        self.invocations.insert(
            id,
            Invocation {
                task: name.to_string(),
                token: token.clone(),
            },
        );
        self.spawn_invocation(id, name, def, token);
        self.reporter.task_started(name);
        debug!(task = %name, invocation = id, "TaskBoard::start: invocation spawned");
        Ok(())
    }

    fn spawn_invocation(&self, id: InvocationId, name: &str, def: TaskDef, token: CancellationToken) {
        let (events, mut rx) = event_channel(self.event_capacity);

        let engine = self.engine.clone();
        let task = name.to_string();
        tokio::spawn(async move {
            engine.run(&task, &def, events, token).await;
        });

        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Output never waits on a busy controller; status changes do
                if !event.is_lifecycle() {
                    match inbox.try_send(ControlRequest::Event { invocation: id, event }) {
                        Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => continue,
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            debug!(invocation = id, "forwarder: controller gone");
                            return;
                        }
                    }
                }
                if inbox.send(ControlRequest::Event { invocation: id, event }).await.is_err() {
                    debug!(invocation = id, "forwarder: controller gone");
                    return;
                }
            }
            let _ = inbox.send(ControlRequest::StreamClosed { invocation: id }).await;
        });
    }

    /// Cancel the task's own invocation; false when it has none
    pub fn kill(&self, name: &str) -> bool {
        let Some(id) = self.tasks.get(name).and_then(|row| row.invocation) else {
            debug!(task = %name, "TaskBoard::kill: no invocation to cancel");
            return false;
        };
        match self.invocations.get(&id) {
            Some(invocation) => {
                invocation.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) {
        debug!(count = self.invocations.len(), "TaskBoard::kill_all: called");
        for invocation in self.invocations.values() {
            invocation.token.cancel();
        }
    }

    /// Apply one event from invocation `id`
    pub fn apply(&mut self, id: InvocationId, event: RunEvent) -> Option<FinishedTask> {
        match event {
            RunEvent::TaskStarted { task_name } => {
                self.task_started(&task_name);
                None
            }
            RunEvent::OutputLine { source_id, line } => {
                self.route_output(&source_id, line);
                None
            }
            RunEvent::TaskFinished {
                task_id,
                exit_code,
                error,
                canceled,
            } => self.task_finished(id, &task_id, exit_code, error, canceled),
            RunEvent::StepStarted { step_id } => {
                if let Some(step) = self.steps.get_mut(&step_id) {
                    step.reset();
                    step.status = TaskStatus::Running;
                }
                None
            }
            RunEvent::StepFinished {
                step_id,
                exit_code,
                error,
                canceled,
            } => {
                if let Some(step) = self.steps.get_mut(&step_id) {
                    step.status = TaskStatus::finished(error.is_some(), canceled);
                    step.exit_code = exit_code;
                    self.reporter
                        .step_finished(&format!("{} {}", step.owner, step.label), step.status, exit_code);
                }
                None
            }
        }
    }

    /// The invocation's channel closed; settles a task whose engine never reported
    pub fn stream_closed(&mut self, id: InvocationId) -> Option<FinishedTask> {
        let invocation = self.invocations.remove(&id)?;
        let row = self.tasks.get_mut(&invocation.task)?;
        if row.invocation != Some(id) {
            return None;
        }

        warn!(task = %invocation.task, "Invocation ended without reporting completion");
        row.invocation = None;
        row.running = false;
        row.status = TaskStatus::Failed;
        row.exit_code = -1;
        row.error = Some(RunError::Worker("invocation ended unexpectedly".to_string()));
        Some(FinishedTask {
            task: invocation.task,
            failed: true,
            outermost: true,
        })
    }

    fn task_started(&mut self, name: &str) {
        let Some(row) = self.tasks.get_mut(name) else {
            return;
        };
        // The outermost start was applied when the invocation was spawned
        if row.running {
            return;
        }
        row.mark_running();
        self.prepare_steps(name);
        self.reset_children(name);
    }

    fn task_finished(
        &mut self,
        id: InvocationId,
        name: &str,
        exit_code: i32,
        error: Option<RunError>,
        canceled: bool,
    ) -> Option<FinishedTask> {
        let outermost = self.invocations.get(&id).is_some_and(|inv| inv.task == name);
        let failed = error.is_some();
        let row = self.tasks.get_mut(name)?;

        // A nested run elsewhere must not settle a task that has its own invocation
        if row.invocation.is_some_and(|own| own != id || !outermost) {
            debug!(task = %name, invocation = id, "TaskBoard::task_finished: nested run of busy task");
        } else {
            row.running = false;
            row.status = TaskStatus::finished(failed, canceled);
            row.exit_code = exit_code;
            row.error = error;
            row.targets.clear();
            if outermost {
                row.invocation = None;
            }
            let message = row.error.as_ref().map(ToString::to_string);
            self.reporter
                .task_finished(name, row.status, exit_code, message.as_deref());
        }

        Some(FinishedTask {
            task: name.to_string(),
            failed,
            outermost,
        })
    }

    fn route_output(&mut self, source: &str, line: String) {
        if let Some(row) = self.tasks.get_mut(source) {
            row.output.push(line.clone());
        }
        let label = match self.steps.get_mut(source) {
            Some(step) => {
                step.output.push(line.clone());
                format!("{}:{}", step.owner, step.prefix)
            }
            None => source.to_string(),
        };

        // Also show it under every running task that owns the step or child
        let owner = parse_step_id(source).map(|(owner, _, _)| owner.to_string());
        for row in self.tasks.values_mut() {
            if !row.running || row.targets.is_empty() {
                continue;
            }
            let target = row
                .targets
                .get(source)
                .or_else(|| owner.as_deref().and_then(|owner| row.targets.get(owner)));
            if let Some(target) = target {
                let text = format!("{}: {}", target.prefix, line);
                row.output.push(text);
            }
        }

        self.reporter.output(&label, &line);
    }

    /// Build step rows and output targets for a multi-step task
    fn prepare_steps(&mut self, name: &str) {
        let Some(row) = self.tasks.get_mut(name) else {
            return;
        };
        row.steps.clear();
        row.targets.clear();

        let registry = self.engine.registry();
        let plan = select_mode(&row.def, registry);
        if !plan.multi {
            return;
        }

        for (index, step) in plan.steps.iter().enumerate() {
            let (kind, value) = classify(step, registry);
            let id = step_id(name, plan.mode, index);
            let display = step.display_name().to_string();
            let named = step.name.as_deref().is_some_and(|n| !n.trim().is_empty());
            let child_task = kind == StepKind::Task;
            let prefix = if child_task || named {
                display.clone()
            } else {
                (index + 1).to_string()
            };

            let key = if child_task { value } else { id.clone() };
            row.targets.insert(
                key,
                StepTarget {
                    prefix: prefix.clone(),
                    child_task,
                },
            );
            row.steps.push(id.clone());

            let limit = self.output_limit;
            let step_row = self.steps.entry(id).or_insert_with(|| StepRow {
                owner: name.to_string(),
                label: String::new(),
                prefix: String::new(),
                status: TaskStatus::Idle,
                exit_code: 0,
                output: OutputBuffer::new(limit),
            });
            step_row.label = format!("{}. {}", index + 1, display);
            step_row.prefix = prefix;
            step_row.reset();
        }
    }

    /// Clear the status of idle child tasks referenced by `name`'s steps
    fn reset_children(&mut self, name: &str) {
        let Some(row) = self.tasks.get(name) else {
            return;
        };
        let children: Vec<String> = row
            .targets
            .iter()
            .filter(|(_, target)| target.child_task)
            .map(|(child, _)| child.clone())
            .collect();

        for child in children {
            let Some(child_row) = self.tasks.get_mut(&child) else {
                continue;
            };
            if child_row.running {
                continue;
            }
            child_row.reset();
            for id in &child_row.steps {
                if let Some(step) = self.steps.get_mut(id) {
                    step.reset();
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.order
            .iter()
            .filter_map(|name| self.tasks.get(name))
            .map(|row| TaskSnapshot {
                name: row.def.name.clone(),
                status: row.status,
                exit_code: row.exit_code,
                error: row.error.as_ref().map(ToString::to_string),
                output: row.output.to_vec(),
                steps: row
                    .steps
                    .iter()
                    .filter_map(|id| self.steps.get(id).map(|step| (id, step)))
                    .map(|(id, step)| StepSnapshot {
                        id: id.clone(),
                        label: step.label.clone(),
                        status: step.status,
                        exit_code: step.exit_code,
                        output: step.output.to_vec(),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.len()
    }

    pub fn snapshot_all(&self, active_combos: Vec<String>) -> ControllerSnapshot {
        ControllerSnapshot {
            tasks: self.snapshot(),
            active_combos,
            invocations: self.invocation_count(),
        }
    }
}

impl TaskStarter for TaskBoard {
    fn start_task(&mut self, name: &str) -> bool {
        match self.start(name) {
            Ok(()) => true,
            Err(e) => {
                debug!(task = %name, error = %e, "TaskBoard::start_task: not started");
                false
            }
        }
    }
}
