//! Process-tree teardown strategies
//!
//! Selected at build time through [`platform_killer`]:
//! - Unix: signal the child's process group and every descendant found in
//!   the process table, SIGTERM first, SIGKILL after a grace interval
//! - Elsewhere: kill only the tracked child handle; grandchildren may be
//!   orphaned

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

/// Default grace interval between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(200);

/// Strategy for tearing down a spawned child and its descendants
#[async_trait]
pub trait ProcessKiller: Send + Sync {
    /// Adjust the command before spawn (e.g. place it in its own group)
    fn prepare(&self, cmd: &mut Command);

    /// Terminate the child and whatever it spawned
    async fn kill(&self, child: &mut Child);
}

/// The killer for the current platform
pub fn platform_killer(grace: Duration) -> Arc<dyn ProcessKiller> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupKiller::new(grace))
    }
    #[cfg(not(unix))]
    {
        let _ = grace;
        Arc::new(DirectKiller)
    }
}

/// Kills only the tracked child handle
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectKiller;

#[async_trait]
impl ProcessKiller for DirectKiller {
    fn prepare(&self, _cmd: &mut Command) {}

    async fn kill(&self, child: &mut Child) {
        debug!(pid = ?child.id(), "DirectKiller::kill: called");
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "DirectKiller::kill: start_kill failed");
        }
    }
}

/// Signals the whole process tree, gracefully then forcefully
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroupKiller {
    grace: Duration,
}

#[cfg(unix)]
impl ProcessGroupKiller {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[cfg(unix)]
impl Default for ProcessGroupKiller {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE)
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessKiller for ProcessGroupKiller {
    fn prepare(&self, cmd: &mut Command) {
        cmd.process_group(0);
    }

    async fn kill(&self, child: &mut Child) {
        use nix::sys::signal::Signal;

        let Some(pid) = child.id() else {
            debug!("ProcessGroupKiller::kill: child already reaped");
            return;
        };
        let pid = pid as i32;
        debug!(pid, grace_ms = self.grace.as_millis() as u64, "ProcessGroupKiller::kill: called");

        // Snapshot once so the SIGKILL pass hits the same set even if the
        // SIGTERM pass reparents some of them.
        let descendants = descendants_of(pid).await;
        debug!(pid, count = descendants.len(), "ProcessGroupKiller::kill: descendants found");

        signal_tree(pid, &descendants, Signal::SIGTERM);
        tokio::time::sleep(self.grace).await;
        signal_tree(pid, &descendants, Signal::SIGKILL);

        if let Err(e) = child.start_kill() {
            debug!(pid, error = %e, "ProcessGroupKiller::kill: start_kill failed");
        }
    }
}

#[cfg(unix)]
fn signal_tree(pid: i32, descendants: &[i32], signal: nix::sys::signal::Signal) {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::{Pid, getpgid, getpgrp};

    let root = Pid::from_raw(pid);
    match getpgid(Some(root)) {
        // Never signal our own group
        Ok(pgid) if pgid != getpgrp() => {
            if let Err(e) = killpg(pgid, signal) {
                debug!(pid, ?signal, error = %e, "signal_tree: killpg failed");
            }
        }
        Ok(_) => debug!(pid, "signal_tree: child shares our process group, skipping killpg"),
        Err(e) => debug!(pid, error = %e, "signal_tree: getpgid failed"),
    }

    for &descendant in descendants {
        // ESRCH is expected once the group signal has landed
        let _ = kill(Pid::from_raw(descendant), signal);
    }
}

#[cfg(unix)]
async fn descendants_of(root: i32) -> Vec<i32> {
    let output = match Command::new("ps").args(["-axo", "pid=,ppid="]).output().await {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(status = ?output.status, "descendants_of: ps failed");
            return Vec::new();
        }
        Err(e) => {
            debug!(error = %e, "descendants_of: ps could not be started");
            return Vec::new();
        }
    };
    descendants_from_table(&String::from_utf8_lossy(&output.stdout), root)
}

/// Walk a `pid ppid` table depth-first from `root`, excluding `root` itself
pub fn descendants_from_table(table: &str, root: i32) -> Vec<i32> {
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(ppid)) = (fields.next(), fields.next()) else {
            continue;
        };
        if let (Ok(pid), Ok(ppid)) = (pid.parse::<i32>(), ppid.parse::<i32>()) {
            children.entry(ppid).or_default().push(pid);
        }
    }

    let mut found = Vec::new();
    let mut pending = vec![root];
    while let Some(parent) = pending.pop() {
        if let Some(kids) = children.get(&parent) {
            for &kid in kids {
                if kid != root && !found.contains(&kid) {
                    found.push(kid);
                    pending.push(kid);
                }
            }
        }
    }
    found
}
