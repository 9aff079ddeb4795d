//! Suite - interactive shell task runner
//!
//! CLI entry point for running tasks and combos from a `.suite.yml`.

use std::fs;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use suite::cli::{Cli, Command, generate_after_help, get_log_path};
use suite::config::Config;
use suite::controller::{ConsoleReporter, Controller, ControllerHandle, ControllerSnapshot, TaskStatus};
use suite::domain::TaskTable;
use suite::init::run_init;
use suite::runner::{ProcessLauncher, TaskEngine, platform_killer};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    if let Some(Command::Init { path }) = &cli.command {
        debug!(?path, "main: matched Init command");
        let written = run_init(path.as_deref())?;
        println!("Created {}", written.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(title = %config.title, tasks = config.tasks.len(), "Suite loaded config");

    let code = match cli.command {
        Some(Command::Run { task }) => {
            debug!(%task, "main: matched Run command");
            cmd_run(&config, &task).await?
        }
        Some(Command::Combo { combo }) => {
            debug!(%combo, "main: matched Combo command");
            cmd_combo(&config, &combo).await?
        }
        Some(Command::List) | None => {
            debug!("main: listing tasks");
            cmd_list(&config);
            0
        }
        Some(Command::Init { .. }) => 0,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Print visible tasks and every combo
fn cmd_list(config: &Config) {
    debug!("cmd_list: called");
    println!("{}", config.title.bold());

    println!();
    println!("{}", "Tasks".underline());
    for task in config.tasks.iter().filter(|t| !t.hidden) {
        let key = task.key.as_deref().unwrap_or(" ");
        println!("  [{}] {:<20} {}", key.cyan(), task.name, task.summary().dimmed());
    }

    if config.combos.is_empty() {
        return;
    }
    println!();
    println!("{}", "Combos".underline());
    for combo in &config.combos {
        let key = combo.key.as_deref().unwrap_or(" ");
        println!(
            "  [{}] {:<20} {} {}",
            key.cyan(),
            combo.name,
            combo.mode.to_string().dimmed(),
            combo.run.join(", ")
        );
    }
}

/// Build the controller from config and spawn its loop
fn spawn_controller(config: &Config) -> (ControllerHandle, tokio::task::JoinHandle<()>) {
    debug!("spawn_controller: called");
    let registry = Arc::new(TaskTable::new(config.tasks.clone()));
    let launcher = ProcessLauncher::new(config.shell.clone(), config.init.clone(), platform_killer(config.kill_grace()));
    let engine = TaskEngine::new(registry, launcher);
    let controller = Controller::new(
        engine,
        config.tasks.clone(),
        config.combos.clone(),
        config.controller_config(),
        Arc::new(ConsoleReporter),
    );
    controller.spawn()
}

/// Kill everything on Ctrl-C; a second Ctrl-C exits immediately
fn watch_interrupt(handle: ControllerHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, killing all tasks");
        eprintln!("{}", "Interrupted, stopping tasks...".yellow());
        let _ = handle.kill_all().await;

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

/// Wait for the controller to settle, then stop it
async fn finish(handle: &ControllerHandle, join: tokio::task::JoinHandle<()>) -> Result<ControllerSnapshot> {
    handle.wait_idle().await?;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    if let Err(e) = join.await {
        warn!(error = %e, "Controller task ended abnormally");
    }
    Ok(snapshot)
}

/// Run one task to completion and return the process exit code
async fn cmd_run(config: &Config, name_or_key: &str) -> Result<i32> {
    debug!(%name_or_key, "cmd_run: called");
    let task = config
        .find_task(name_or_key)
        .ok_or_else(|| eyre!("unknown task {:?}", name_or_key))?
        .name
        .clone();

    let (handle, join) = spawn_controller(config);
    watch_interrupt(handle.clone());
    handle.start_task(&task).await?;
    let snapshot = finish(&handle, join).await?;

    let code = match snapshot.task(&task) {
        Some(row) if row.status == TaskStatus::Success => 0,
        Some(row) if row.status == TaskStatus::Canceled => 130,
        Some(row) if row.exit_code > 0 => row.exit_code,
        _ => 1,
    };
    debug!(%task, code, "cmd_run: finished");
    Ok(code)
}

/// Run one combo to completion; exit code 1 if any of its tasks failed
async fn cmd_combo(config: &Config, name_or_key: &str) -> Result<i32> {
    debug!(%name_or_key, "cmd_combo: called");
    let combo = config
        .find_combo(name_or_key)
        .ok_or_else(|| eyre!("unknown combo {:?}", name_or_key))?
        .clone();

    let (handle, join) = spawn_controller(config);
    watch_interrupt(handle.clone());
    handle.trigger_combo(&combo.name).await?;
    let snapshot = finish(&handle, join).await?;

    let failed = combo.run.iter().any(|task| {
        snapshot
            .task(task)
            .is_some_and(|row| matches!(row.status, TaskStatus::Failed | TaskStatus::Canceled))
    });
    debug!(combo = %combo.name, failed, "cmd_combo: finished");
    Ok(if failed { 1 } else { 0 })
}
