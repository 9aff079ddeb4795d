//! Suite configuration types and loading

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result, bail, eyre};
use serde::Deserialize;
use tracing::{debug, info};

use crate::controller::ControllerConfig;
use crate::domain::{ComboDef, Step, StepKind, TaskDef, deserialize_commands};
use crate::events::DEFAULT_CHANNEL_CAPACITY;
use crate::runner::DEFAULT_SHELL;

/// Config file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = ".suite.yml";

/// Main suite configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Dashboard title
    #[serde(default)]
    pub title: String,

    /// Shell used to run every command
    #[serde(default)]
    pub shell: String,

    /// Commands prepended to every command line
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub init: Vec<String>,

    /// Log level when `--log-level` is not given
    #[serde(default, rename = "log-level")]
    pub log_level: Option<String>,

    /// Per-invocation event buffer
    #[serde(default = "default_channel_capacity", rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// Grace interval between SIGTERM and SIGKILL
    #[serde(default = "default_kill_grace_ms", rename = "kill-grace-ms")]
    pub kill_grace_ms: u64,

    /// Max retained output lines per task and step
    #[serde(default = "default_output_limit", rename = "output-limit")]
    pub output_limit: usize,

    #[serde(default)]
    pub tasks: Vec<TaskDef>,

    #[serde(default)]
    pub combos: Vec<ComboDef>,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_kill_grace_ms() -> u64 {
    200
}

fn default_output_limit() -> usize {
    10_000
}

impl Config {
    /// Load configuration from an explicit path or `./.suite.yml`
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config)
                .context(format!("Failed to load config from {}", local_config.display()));
        }

        Err(eyre!(
            "No {} found in the current directory (run `suite init` to create one)",
            DEFAULT_CONFIG_FILE
        ))
    }

    /// Read just the log level, before logging is set up
    ///
    /// Any read or parse failure yields `None`; the full load reports it.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        #[derive(Deserialize)]
        struct LogLevelOnly {
            #[serde(rename = "log-level")]
            log_level: Option<String>,
        }

        let path = config_path.cloned().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content)
            .ok()?
            .log_level
            .map(|level| level.trim().to_lowercase())
            .filter(|level| !level.is_empty())
    }

    /// Read, normalize and validate a config file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content, path.as_ref())?;
        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse, normalize and validate config text; `path` feeds the title fallback
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.normalize(path);
        config.validate()?;
        Ok(config)
    }

    /// Fill defaults and trim every name, key and step
    pub fn normalize(&mut self, path: &Path) {
        debug!(path = %path.display(), "Config::normalize: called");
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            self.title = default_title(path);
        }

        self.shell = self.shell.trim().to_string();
        if self.shell.is_empty() {
            self.shell = std::env::var("SHELL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SHELL.to_string());
        }

        self.log_level = self
            .log_level
            .take()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        self.init = self.init.iter().map(|c| c.trim().to_string()).collect();

        for task in &mut self.tasks {
            task.name = task.name.trim().to_string();
            task.key = trimmed(task.key.take());
            normalize_steps(&mut task.cmd);
            normalize_steps(&mut task.parallel);
            normalize_steps(&mut task.seq);
            if task.name.is_empty() {
                task.name = default_task_name(task);
            }
        }

        for combo in &mut self.combos {
            combo.name = combo.name.trim().to_string();
            combo.key = trimmed(combo.key.take());
            combo.run = combo.run.iter().map(|t| t.trim().to_string()).collect();
            if combo.name.is_empty() {
                combo.name = combo.key.clone().unwrap_or_else(|| "combo".to_string());
            }
        }
    }

    /// Check the rules a runnable configuration must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            bail!("config must define at least one task");
        }
        if self.init.iter().any(|c| c.trim().is_empty()) {
            bail!("init commands must be non-empty");
        }

        let mut task_names = HashSet::new();
        let mut key_used: HashMap<&str, String> = HashMap::new();

        for task in &self.tasks {
            if let Some(key) = task.key.as_ref().filter(|k| k.chars().count() != 1) {
                bail!("task key {key:?} must be a single character");
            }
            let specs = [&task.cmd, &task.parallel, &task.seq]
                .iter()
                .filter(|steps| !steps.is_empty())
                .count();
            if specs == 0 {
                bail!("task {:?} is missing cmd", task.name);
            }
            if specs > 1 {
                bail!("task {:?} must define only one of cmd, parallel or seq", task.name);
            }
            if task.step_spec().iter().any(|s| s.value.trim().is_empty()) {
                bail!("task {:?} has empty commands", task.name);
            }
            if task.name.is_empty() {
                bail!("task name is required");
            }
            if !task_names.insert(task.name.as_str()) {
                bail!("duplicate task name {:?}", task.name);
            }
            if let Some(key) = &task.key {
                if let Some(prev) = key_used.get(key.as_str()) {
                    bail!("key {key:?} already assigned to {prev}");
                }
                key_used.insert(key.as_str(), format!("task {:?}", task.name));
            }
        }

        let mut combo_names = HashSet::new();
        for combo in &self.combos {
            let Some(key) = &combo.key else {
                bail!("combo {:?} is missing key", combo.name);
            };
            if key.chars().count() != 1 {
                bail!("combo {:?} key must be a single character", combo.name);
            }
            if combo.run.is_empty() {
                bail!("combo {:?} has no tasks", combo.name);
            }
            if combo.name.is_empty() {
                bail!("combo name is required");
            }
            if !combo_names.insert(combo.name.as_str()) {
                bail!("duplicate combo name {:?}", combo.name);
            }
            if let Some(prev) = key_used.get(key.as_str()) {
                bail!("key {key:?} already assigned to {prev}");
            }
            key_used.insert(key.as_str(), format!("combo {:?}", combo.name));

            if let Some(unknown) = combo.run.iter().find(|t| !task_names.contains(t.as_str())) {
                bail!("combo {:?} references unknown task {unknown:?}", combo.name);
            }
        }

        for task in &self.tasks {
            let unknown = task
                .step_spec()
                .iter()
                .find(|s| s.kind == StepKind::Task && !task_names.contains(s.value.as_str()));
            if let Some(step) = unknown {
                bail!("task {:?} references unknown task {:?}", task.name, step.value);
            }
        }

        Ok(())
    }

    /// Find a task by name, falling back to its hotkey
    pub fn find_task(&self, name_or_key: &str) -> Option<&TaskDef> {
        self.tasks
            .iter()
            .find(|t| t.name == name_or_key)
            .or_else(|| self.tasks.iter().find(|t| t.key.as_deref() == Some(name_or_key)))
    }

    /// Find a combo by name, falling back to its hotkey
    pub fn find_combo(&self, name_or_key: &str) -> Option<&ComboDef> {
        self.combos
            .iter()
            .find(|c| c.name == name_or_key)
            .or_else(|| self.combos.iter().find(|c| c.key.as_deref() == Some(name_or_key)))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            event_capacity: self.channel_capacity,
            output_limit: self.output_limit,
            ..Default::default()
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize_steps(steps: &mut [Step]) {
    for step in steps {
        step.value = step.value.trim().to_string();
        step.name = trimmed(step.name.take());
    }
}

fn default_task_name(task: &TaskDef) -> String {
    let summary = task.summary();
    if !summary.is_empty() {
        return summary;
    }
    task.key.clone().unwrap_or_else(|| "task".to_string())
}

/// Current directory name, else the config file stem, else `suite`
fn default_title(path: &Path) -> String {
    let from_cwd = std::env::current_dir()
        .ok()
        .and_then(|cwd| cwd.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|n| !n.is_empty() && n != ".");
    if let Some(title) = from_cwd {
        return title;
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().trim_start_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "suite".to_string())
}
