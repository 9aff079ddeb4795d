//! Shell process launcher
//!
//! Spawns `<shell> -c "<init; command>"`, streams stdout and stderr as
//! output lines, and maps the exit status into an [`Outcome`]. Teardown on
//! cancellation is delegated to a [`ProcessKiller`].

use std::io::IsTerminal;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::kill::ProcessKiller;
use crate::error::{Outcome, RunError};
use crate::events::EventSender;

/// Shell used when none is configured
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// How long to wait for the output readers once the child has exited
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Join non-blank init commands and the trimmed command with `"; "`
pub fn build_shell_command(init: &[String], command: &str) -> String {
    let command = command.trim();
    init.iter()
        .map(String::as_str)
        .filter(|part| !part.trim().is_empty())
        .chain((!command.is_empty()).then_some(command))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs single shell commands on behalf of the engine
#[derive(Clone)]
pub struct ProcessLauncher {
    shell: String,
    init: Vec<String>,
    killer: Arc<dyn ProcessKiller>,
    attach_stdin: bool,
}

impl std::fmt::Debug for ProcessLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLauncher")
            .field("shell", &self.shell)
            .field("init", &self.init)
            .field("attach_stdin", &self.attach_stdin)
            .finish_non_exhaustive()
    }
}

impl ProcessLauncher {
    /// Create a launcher; stdin is attached only when ours is a terminal
    pub fn new(shell: impl Into<String>, init: Vec<String>, killer: Arc<dyn ProcessKiller>) -> Self {
        let shell = shell.into();
        let shell = if shell.trim().is_empty() {
            DEFAULT_SHELL.to_string()
        } else {
            shell
        };
        Self {
            shell,
            init,
            killer,
            attach_stdin: std::io::stdin().is_terminal(),
        }
    }

    /// Override whether children inherit our stdin
    pub fn with_stdin(mut self, attach: bool) -> Self {
        self.attach_stdin = attach;
        self
    }

    /// Run one command, attributing its output to `target`
    pub async fn run(&self, cancel: &CancellationToken, command: &str, target: &str, events: &EventSender) -> Outcome {
        debug!(%target, %command, "ProcessLauncher::run: called");
        if cancel.is_cancelled() {
            debug!(%target, "ProcessLauncher::run: already canceled, not spawning");
            return Outcome::error(RunError::Canceled);
        }

        let line = build_shell_command(&self.init, command);
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&line)
            .env("SHELL", &self.shell)
            .stdin(if self.attach_stdin {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.killer.prepare(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = %self.shell, error = %e, "Failed to spawn shell");
                return Outcome::error(RunError::Spawn {
                    shell: self.shell.clone(),
                    message: e.to_string(),
                });
            }
        };
        debug!(%target, pid = ?child.id(), "ProcessLauncher::run: spawned");

        let mut readers = JoinSet::new();
        if let Some(stdout) = child.stdout.take() {
            readers.spawn(forward_lines(stdout, target.to_string(), events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.spawn(forward_lines(stderr, target.to_string(), events.clone()));
        }

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let status = match waited {
            Some(status) => status,
            None => {
                debug!(%target, "ProcessLauncher::run: canceled, killing process tree");
                self.killer.kill(&mut child).await;
                child.wait().await
            }
        };

        // A detached grandchild can hold the pipes open past our child's exit
        let drained = tokio::time::timeout(READER_DRAIN_TIMEOUT, async {
            while readers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!(%target, "ProcessLauncher::run: output readers still open, aborting");
            readers.abort_all();
        }

        let outcome = match status {
            Ok(status) => outcome_from_status(status),
            Err(e) => Outcome::error(RunError::Wait(e.to_string())),
        };
        debug!(%target, exit_code = outcome.exit_code, "ProcessLauncher::run: finished");
        outcome
    }
}

fn outcome_from_status(status: ExitStatus) -> Outcome {
    match status.code() {
        Some(0) => Outcome::success(),
        Some(code) => Outcome::failed(code, RunError::Exit(code)),
        None => Outcome::error(RunError::Terminated),
    }
}

async fn forward_lines<R>(reader: R, target: String, events: EventSender)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut dropped = 0usize;
    loop {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let mut line = String::from_utf8_lossy(&bytes).into_owned();
                if line.ends_with('\r') {
                    line.pop();
                }
                if !events.output_line(&target, line) {
                    dropped += 1;
                }
            }
            Ok(None) => break,
            Err(e) => {
                events.output_line(&target, format!("[stream error] {e}"));
                break;
            }
        }
    }
    if dropped > 0 {
        debug!(%target, dropped, "forward_lines: lines dropped on full channel");
    }
}
