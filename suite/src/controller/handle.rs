//! ControllerHandle - Client interface for the Controller

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{ControlRequest, ControllerSnapshot};

/// Handle for sending requests to the Controller
///
/// Cloneable; every operation is a message to the controller loop.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControllerHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControlRequest>) -> Self {
        Self { tx }
    }

    async fn send(&self, req: ControlRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| eyre!("Controller channel closed"))
    }

    /// Start a task; fails if it is unknown, running, or claimed by a combo
    pub async fn start_task(&self, name: &str) -> Result<()> {
        debug!(%name, "ControllerHandle::start_task: called");
        let (reply, reply_rx) = oneshot::channel();
        self.send(ControlRequest::StartTask {
            name: name.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| eyre!("Controller dropped the request"))??;
        Ok(())
    }

    /// Trigger a combo; fails if it is unknown, active, or has a running task
    pub async fn trigger_combo(&self, name: &str) -> Result<()> {
        debug!(%name, "ControllerHandle::trigger_combo: called");
        let (reply, reply_rx) = oneshot::channel();
        self.send(ControlRequest::TriggerCombo {
            name: name.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| eyre!("Controller dropped the request"))??;
        Ok(())
    }

    pub async fn kill_task(&self, name: &str) -> Result<()> {
        debug!(%name, "ControllerHandle::kill_task: called");
        self.send(ControlRequest::KillTask { name: name.to_string() }).await
    }

    pub async fn restart_task(&self, name: &str) -> Result<()> {
        debug!(%name, "ControllerHandle::restart_task: called");
        self.send(ControlRequest::RestartTask { name: name.to_string() })
            .await
    }

    pub async fn kill_all(&self) -> Result<()> {
        debug!("ControllerHandle::kill_all: called");
        self.send(ControlRequest::KillAll).await
    }

    /// Get a copy of the current status tables
    pub async fn snapshot(&self) -> Result<ControllerSnapshot> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(ControlRequest::Snapshot { reply }).await?;
        reply_rx.await.map_err(|_| eyre!("Controller dropped the request"))
    }

    /// Wait until no invocation and no combo is active
    pub async fn wait_idle(&self) -> Result<()> {
        debug!("ControllerHandle::wait_idle: called");
        let (reply, reply_rx) = oneshot::channel();
        self.send(ControlRequest::WaitIdle { reply }).await?;
        reply_rx.await.map_err(|_| eyre!("Controller stopped before becoming idle"))
    }

    /// Request shutdown; running invocations are canceled
    pub async fn shutdown(&self) -> Result<()> {
        debug!("ControllerHandle::shutdown: called");
        self.send(ControlRequest::Shutdown).await
    }
}
