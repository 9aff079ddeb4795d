//! CLI command definitions and subcommands

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

/// Suite - interactive shell task runner
#[derive(Parser, Debug)]
#[command(
    name = "suite",
    about = "Run named shell tasks, nested task graphs and combos",
    version = env!("GIT_DESCRIBE")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file (default: .suite.yml)")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run a task and stream its output
    Run {
        /// Task name or hotkey
        #[arg(value_name = "TASK")]
        task: String,
    },

    /// Run a combo to completion
    Combo {
        /// Combo name or hotkey
        #[arg(value_name = "COMBO")]
        combo: String,
    },

    /// List tasks and combos (default)
    List,

    /// Write a starter config
    Init {
        /// Where to write it
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("suite")
        .join("logs")
        .join("suite.log")
}

/// Executables suite shells out to
#[cfg(unix)]
const REQUIRED_TOOLS: &[&str] = &["sh", "ps"];
#[cfg(not(unix))]
const REQUIRED_TOOLS: &[&str] = &["sh"];

/// Locate `name` on `PATH`
fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Generate the after_help text with tool checks and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Required Tools:\n");
    for tool in REQUIRED_TOOLS {
        let (icon, location) = match find_on_path(tool) {
            Some(path) => ("\u{2705}", path.display().to_string()),
            None => ("\u{274C}", "not found".to_string()),
        };
        help.push_str(&format!("  {} {:<10} {}\n", icon, tool, location));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["suite", "-c", "x.yml", "run", "build"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        assert_eq!(
            cli.command,
            Some(Command::Run {
                task: "build".to_string()
            })
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["suite", "combo", "a", "--log-level", "debug"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(
            cli.command,
            Some(Command::Combo {
                combo: "a".to_string()
            })
        );
    }

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::parse_from(["suite"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_init_path_optional() {
        let cli = Cli::parse_from(["suite", "init"]);
        assert_eq!(cli.command, Some(Command::Init { path: None }));
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("suite/logs/suite.log"));
    }

    #[test]
    fn test_after_help_shows_log_path_and_tools() {
        let help = generate_after_help();
        assert!(help.contains(&get_log_path().display().to_string()));
        assert!(help.contains("Required Tools:"));
        for tool in REQUIRED_TOOLS {
            assert!(help.contains(tool));
        }
    }
}
