//! Task execution engine
//!
//! One call to [`TaskEngine::run`] is one task invocation. The engine walks
//! the task's step graph recursively, running literal commands through the
//! [`ProcessLauncher`] and nested task references through itself, and emits
//! every lifecycle transition on the invocation's event channel.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::ProcessLauncher;
use super::resolver::{classify, select_mode, step_id};
use super::stack::ExecutionStack;
use crate::domain::{Step, StepKind, StepMode, TaskDef, TaskRegistry};
use crate::error::{Outcome, RunError};
use crate::events::EventSender;

/// Recursive executor for task step graphs
#[derive(Clone)]
pub struct TaskEngine {
    registry: Arc<dyn TaskRegistry>,
    launcher: ProcessLauncher,
}

impl TaskEngine {
    pub fn new(registry: Arc<dyn TaskRegistry>, launcher: ProcessLauncher) -> Self {
        Self { registry, launcher }
    }

    pub fn registry(&self) -> &dyn TaskRegistry {
        self.registry.as_ref()
    }

    /// Run one outermost invocation of `name`
    ///
    /// Consumes `events`; the channel closes once the final `TaskFinished`
    /// has been sent and every worker has let go of its sender.
    pub async fn run(&self, name: &str, def: &TaskDef, events: EventSender, cancel: CancellationToken) -> Outcome {
        info!(task = %name, "Task invocation started");
        let outcome = self
            .clone()
            .execute(name.to_string(), def.clone(), ExecutionStack::root(name), events, cancel)
            .await;
        info!(task = %name, exit_code = outcome.exit_code, error = ?outcome.error, "Task invocation finished");
        outcome
    }

    /// Look up `name` in the registry and run it
    ///
    /// An unknown name yields a `TaskStarted`/`TaskFinished` pair carrying
    /// the error so the consumer still sees the attempt.
    pub async fn run_named(&self, name: &str, events: EventSender, cancel: CancellationToken) -> Outcome {
        match self.registry.lookup(name) {
            Some(def) => self.run(name, &def, events, cancel).await,
            None => {
                warn!(task = %name, "Unknown task requested");
                let outcome = Outcome::error(RunError::UnknownTask(name.to_string()));
                events.task_started(name).await;
                events.task_finished(name, &outcome, cancel.is_cancelled()).await;
                outcome
            }
        }
    }

    fn execute(
        self,
        name: String,
        def: TaskDef,
        stack: ExecutionStack,
        events: EventSender,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Outcome> {
        async move {
            events.task_started(&name).await;
            let outcome = self.run_steps(&name, &def, &stack, &events, &cancel).await;
            events.task_finished(&name, &outcome, cancel.is_cancelled()).await;
            outcome
        }
        .boxed()
    }

    async fn run_steps(
        &self,
        name: &str,
        def: &TaskDef,
        stack: &ExecutionStack,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        let plan = select_mode(def, self.registry.as_ref());

        if !plan.multi {
            let Some(step) = plan.steps.first() else {
                return Outcome::error(RunError::NoCommands);
            };
            return match classify(step, self.registry.as_ref()) {
                (StepKind::Task, child) => self.run_child(&child, stack, events, cancel).await,
                (StepKind::Command, command) if command.is_empty() => Outcome::error(RunError::EmptyStep),
                (StepKind::Command, command) => self.launcher.run(cancel, &command, name, events).await,
                (StepKind::Auto, _) => Outcome::error(RunError::UnknownStepKind),
            };
        }

        match plan.mode {
            StepMode::Parallel => self.run_parallel(name, plan.steps, stack, events, cancel).await,
            mode => self.run_sequential(name, mode, &plan.steps, stack, events, cancel).await,
        }
    }

    async fn run_sequential(
        &self,
        name: &str,
        mode: StepMode,
        steps: &[Step],
        stack: &ExecutionStack,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        for (index, step) in steps.iter().enumerate() {
            let outcome = self.run_step(name, mode, index, step, stack, events, cancel).await;
            if !outcome.is_success() {
                debug!(task = %name, index, "TaskEngine::run_sequential: step failed, stopping");
                return outcome;
            }
        }
        Outcome::success()
    }

    /// Run every step concurrently and wait for all of them
    ///
    /// When several branches fail, the first failure the join set yields is
    /// the one reported.
    async fn run_parallel(
        &self,
        name: &str,
        steps: Vec<Step>,
        stack: &ExecutionStack,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        debug!(task = %name, branches = steps.len(), "TaskEngine::run_parallel: called");
        let mut branches = JoinSet::new();
        for (index, step) in steps.into_iter().enumerate() {
            let engine = self.clone();
            let owner = name.to_string();
            let stack = stack.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            branches.spawn(async move {
                engine
                    .run_step(&owner, StepMode::Parallel, index, &step, &stack, &events, &cancel)
                    .await
            });
        }

        let mut first_failure: Option<Outcome> = None;
        while let Some(joined) = branches.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                warn!(task = %name, error = %e, "Parallel step worker failed");
                Outcome::error(RunError::Worker(e.to_string()))
            });
            if !outcome.is_success() && first_failure.is_none() {
                first_failure = Some(outcome);
            }
        }
        first_failure.unwrap_or_else(Outcome::success)
    }

    /// Run one step of a multi-step task, wrapped in step events
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        owner: &str,
        mode: StepMode,
        index: usize,
        step: &Step,
        stack: &ExecutionStack,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        let id = step_id(owner, mode, index);
        let (kind, value) = classify(step, self.registry.as_ref());
        debug!(step_id = %id, ?kind, %value, "TaskEngine::run_step: called");

        events.step_started(&id).await;
        let outcome = match kind {
            _ if value.is_empty() => Outcome::error(RunError::EmptyStep),
            StepKind::Task => self.run_child(&value, stack, events, cancel).await,
            StepKind::Command => self.launcher.run(cancel, &value, &id, events).await,
            StepKind::Auto => Outcome::error(RunError::UnknownStepKind),
        };
        events.step_finished(&id, &outcome, cancel.is_cancelled()).await;
        outcome
    }

    /// Recurse into a referenced task on a copy of the stack
    async fn run_child(
        &self,
        child: &str,
        stack: &ExecutionStack,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        let Some(def) = self.registry.lookup(child) else {
            warn!(task = %child, "Step references unknown task");
            return Outcome::error(RunError::UnknownTask(child.to_string()));
        };
        if stack.contains(child) {
            warn!(task = %child, "Task cycle detected");
            return Outcome::error(RunError::Cycle(child.to_string()));
        }

        let outcome = self
            .clone()
            .execute(child.to_string(), def, stack.with(child), events.clone(), cancel.clone())
            .await;
        if outcome.is_success() {
            Outcome::success()
        } else {
            outcome
        }
    }
}
