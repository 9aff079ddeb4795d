//! Main Controller task implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::ControllerConfig;
use super::handle::ControllerHandle;
use super::messages::{ControlError, ControlRequest, ControllerSnapshot};
use super::report::Reporter;
use super::state::{FinishedTask, TaskBoard};
use crate::combo::{ComboScheduler, ComboUpdate};
use crate::domain::{ComboDef, TaskDef};
use crate::runner::TaskEngine;

/// The single consumer of every invocation's events
///
/// Owns the status tables and drives the combo scheduler. Nothing else
/// mutates either.
pub struct Controller {
    board: TaskBoard,
    scheduler: ComboScheduler,
    combos: HashMap<String, ComboDef>,
    restart_pending: HashSet<String>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    reporter: Arc<dyn Reporter>,
    tx: mpsc::Sender<ControlRequest>,
    rx: mpsc::Receiver<ControlRequest>,
}

impl Controller {
    /// Create a new Controller over validated task and combo definitions
    pub fn new(
        engine: TaskEngine,
        tasks: Vec<TaskDef>,
        combos: Vec<ComboDef>,
        config: ControllerConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        debug!(tasks = tasks.len(), combos = combos.len(), "Controller::new: called");
        let (tx, rx) = mpsc::channel(config.inbox_buffer.max(1));
        let board = TaskBoard::new(
            engine,
            tasks,
            tx.clone(),
            reporter.clone(),
            config.event_capacity,
            config.output_limit,
        );
        Self {
            board,
            scheduler: ComboScheduler::new(),
            combos: combos.into_iter().map(|c| (c.name.clone(), c)).collect(),
            restart_pending: HashSet::new(),
            idle_waiters: Vec::new(),
            reporter,
            tx,
            rx,
        }
    }

    /// Get a handle for sending requests
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(self.tx.clone())
    }

    /// Spawn the run loop, returning a handle to it
    pub fn spawn(self) -> (ControllerHandle, tokio::task::JoinHandle<()>) {
        let handle = self.handle();
        let join = tokio::spawn(self.run());
        (handle, join)
    }

    /// Run the Controller task
    ///
    /// This consumes the Controller and runs until shutdown is requested.
    pub async fn run(mut self) {
        info!("Controller started");

        while let Some(req) = self.rx.recv().await {
            match req {
                ControlRequest::StartTask { name, reply } => {
                    let result = self.start_task(&name);
                    if let Err(e) = &result {
                        debug!(task = %name, error = %e, "Start rejected");
                    }
                    let _ = reply.send(result);
                }

                ControlRequest::TriggerCombo { name, reply } => {
                    let result = self.trigger_combo(&name);
                    if let Err(e) = &result {
                        debug!(combo = %name, error = %e, "Combo rejected");
                    }
                    let _ = reply.send(result);
                }

                ControlRequest::KillTask { name } => {
                    info!(task = %name, "Killing task");
                    self.board.kill(&name);
                }

                ControlRequest::RestartTask { name } => self.restart_task(&name),

                ControlRequest::KillAll => {
                    info!("Killing all tasks");
                    self.restart_pending.clear();
                    self.board.kill_all();
                }

                ControlRequest::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }

                ControlRequest::WaitIdle { reply } => self.idle_waiters.push(reply),

                ControlRequest::Event { invocation, event } => {
                    if let Some(finished) = self.board.apply(invocation, event) {
                        self.task_finished(finished);
                    }
                }

                ControlRequest::StreamClosed { invocation } => {
                    debug!(invocation, "Invocation stream closed");
                    if let Some(finished) = self.board.stream_closed(invocation) {
                        self.task_finished(finished);
                    }
                }

                ControlRequest::Shutdown => {
                    info!("Controller shutting down");
                    self.board.kill_all();
                    break;
                }
            }

            self.notify_idle();
        }

        info!("Controller stopped");
    }

    fn start_task(&mut self, name: &str) -> Result<(), ControlError> {
        if !self.board.contains(name) {
            return Err(ControlError::UnknownTask(name.to_string()));
        }
        if self.board.is_running(name) {
            return Err(ControlError::TaskRunning(name.to_string()));
        }
        if self.scheduler.claims(name) {
            return Err(ControlError::ClaimedByCombo(name.to_string()));
        }
        info!(task = %name, "Starting task");
        self.board.start(name)
    }

    fn trigger_combo(&mut self, name: &str) -> Result<(), ControlError> {
        let Some(def) = self.combos.get(name) else {
            return Err(ControlError::UnknownCombo(name.to_string()));
        };
        if self.scheduler.is_active(name) || def.run.iter().any(|task| self.board.is_running(task)) {
            return Err(ControlError::ComboDisabled(name.to_string()));
        }

        info!(combo = %name, "Triggering combo");
        self.reporter.combo_started(name);
        if !self.scheduler.trigger(def, &mut self.board) {
            self.reporter.combo_finished(name, None);
        }
        Ok(())
    }

    fn restart_task(&mut self, name: &str) {
        if self.board.is_running(name) {
            info!(task = %name, "Restart requested; canceling current run");
            self.restart_pending.insert(name.to_string());
            self.board.kill(name);
            return;
        }
        if let Err(e) = self.start_task(name) {
            warn!(task = %name, error = %e, "Restart failed");
        }
    }

    fn task_finished(&mut self, finished: FinishedTask) {
        debug!(?finished, "Controller::task_finished: called");

        if finished.outermost && !self.board.is_running(&finished.task) && self.restart_pending.remove(&finished.task) {
            info!(task = %finished.task, "Restarting task");
            if let Err(e) = self.start_task(&finished.task) {
                warn!(task = %finished.task, error = %e, "Restart failed");
            }
        }

        for update in self.scheduler.task_finished(&finished.task, finished.failed, &mut self.board) {
            match update {
                ComboUpdate::Completed { combo } => {
                    info!(%combo, "Combo completed");
                    self.reporter.combo_finished(&combo, None);
                }
                ComboUpdate::Aborted { combo, task } => {
                    info!(%combo, %task, "Combo aborted");
                    self.reporter.combo_finished(&combo, Some(&task));
                }
                ComboUpdate::Advanced { combo, task } => {
                    debug!(%combo, %task, "Combo advanced");
                }
            }
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        self.board.snapshot_all(self.scheduler.active())
    }

    fn is_idle(&self) -> bool {
        !self.board.has_invocations() && self.scheduler.is_idle()
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        debug!(waiters = self.idle_waiters.len(), "Controller::notify_idle: idle");
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
