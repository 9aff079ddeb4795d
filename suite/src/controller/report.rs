//! Reporter seam between the controller and whatever displays progress

use colored::Colorize;

use super::messages::TaskStatus;

/// Receives output and lifecycle notices from the controller loop
///
/// Called synchronously from the controller, so implementations must not
/// block for long.
pub trait Reporter: Send + Sync {
    fn task_started(&self, _task: &str) {}

    fn task_finished(&self, _task: &str, _status: TaskStatus, _exit_code: i32, _error: Option<&str>) {}

    fn step_finished(&self, _label: &str, _status: TaskStatus, _exit_code: i32) {}

    /// One output line; `source` is a task name or `task:step` label
    fn output(&self, _source: &str, _line: &str) {}

    fn combo_started(&self, _combo: &str) {}

    fn combo_finished(&self, _combo: &str, _aborted_by: Option<&str>) {}
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Prints prefixed, colored lines to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    fn status_label(status: TaskStatus, exit_code: i32) -> String {
        match status {
            TaskStatus::Success => "ok".green().to_string(),
            TaskStatus::Failed => format!("failed ({exit_code})").red().to_string(),
            TaskStatus::Canceled => "canceled".yellow().to_string(),
            TaskStatus::Running => "running".cyan().to_string(),
            TaskStatus::Idle => "idle".dimmed().to_string(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn task_started(&self, task: &str) {
        println!("{} {}", "▶".cyan(), task.bold());
    }

    fn task_finished(&self, task: &str, status: TaskStatus, exit_code: i32, error: Option<&str>) {
        let label = Self::status_label(status, exit_code);
        match error {
            Some(error) if status == TaskStatus::Failed => {
                println!("{} {} {}: {}", "■".cyan(), task.bold(), label, error.dimmed())
            }
            _ => println!("{} {} {}", "■".cyan(), task.bold(), label),
        }
    }

    fn step_finished(&self, label: &str, status: TaskStatus, exit_code: i32) {
        println!("  {} {}", label.dimmed(), Self::status_label(status, exit_code));
    }

    fn output(&self, source: &str, line: &str) {
        println!("{} {}", format!("[{source}]").dimmed(), line);
    }

    fn combo_started(&self, combo: &str) {
        println!("{} combo {}", "▶".magenta(), combo.bold());
    }

    fn combo_finished(&self, combo: &str, aborted_by: Option<&str>) {
        match aborted_by {
            Some(task) => println!(
                "{} combo {} {}",
                "■".magenta(),
                combo.bold(),
                format!("aborted after {task} failed").red()
            ),
            None => println!("{} combo {} {}", "■".magenta(), combo.bold(), "done".green()),
        }
    }
}
