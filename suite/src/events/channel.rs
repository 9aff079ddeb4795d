//! Per-invocation event channel
//!
//! A bounded queue shared by every worker of one task invocation. Output
//! lines are sent without waiting and dropped when the queue is full so a
//! slow consumer never stalls a child's I/O; lifecycle events wait for room
//! so status transitions are never lost.

use tokio::sync::mpsc;
use tracing::debug;

use super::types::RunEvent;
use crate::error::Outcome;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Receiving half, owned by the consumer
pub type EventReceiver = mpsc::Receiver<RunEvent>;

/// Create a bounded event channel for one invocation
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    debug!(capacity, "event_channel: creating channel");
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, rx)
}

/// Producer handle, cloned into every worker of an invocation
///
/// The channel closes when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<RunEvent>,
}

impl EventSender {
    /// Deliver a lifecycle event, waiting for room in the queue
    ///
    /// A closed channel (consumer gone) is ignored.
    pub async fn emit(&self, event: RunEvent) {
        debug!(event_type = event.event_type(), source = event.source(), "EventSender::emit");
        if self.tx.send(event).await.is_err() {
            debug!("EventSender::emit: receiver dropped");
        }
    }

    /// Deliver an event only if there is room; returns whether it was queued
    pub fn try_emit(&self, event: RunEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    // === Convenience methods ===

    pub async fn task_started(&self, task_name: &str) {
        self.emit(RunEvent::TaskStarted {
            task_name: task_name.to_string(),
        })
        .await;
    }

    pub async fn task_finished(&self, task_id: &str, outcome: &Outcome, canceled: bool) {
        self.emit(RunEvent::TaskFinished {
            task_id: task_id.to_string(),
            exit_code: outcome.exit_code,
            error: outcome.error.clone(),
            canceled,
        })
        .await;
    }

    pub async fn step_started(&self, step_id: &str) {
        self.emit(RunEvent::StepStarted {
            step_id: step_id.to_string(),
        })
        .await;
    }

    pub async fn step_finished(&self, step_id: &str, outcome: &Outcome, canceled: bool) {
        self.emit(RunEvent::StepFinished {
            step_id: step_id.to_string(),
            exit_code: outcome.exit_code,
            error: outcome.error.clone(),
            canceled,
        })
        .await;
    }

    /// Best-effort output line; dropped when the queue is full
    pub fn output_line(&self, source_id: &str, line: String) -> bool {
        self.try_emit(RunEvent::OutputLine {
            source_id: source_id.to_string(),
            line,
        })
    }
}
