//! Task and combo definitions

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use super::step::{Step, deserialize_steps};

/// A named unit of work with exactly one step specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskDef {
    #[serde(default)]
    pub name: String,

    /// Single-character hotkey
    #[serde(default)]
    pub key: Option<String>,

    /// Excluded from listings but still runnable as a nested step
    #[serde(default)]
    pub hidden: bool,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub cmd: Vec<Step>,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub parallel: Vec<Step>,

    #[serde(default, deserialize_with = "deserialize_steps")]
    pub seq: Vec<Step>,
}

impl TaskDef {
    /// Task with a `cmd` step list
    pub fn with_cmd(name: impl Into<String>, cmd: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            cmd,
            ..Default::default()
        }
    }

    /// Task with a `parallel` step list
    pub fn with_parallel(name: impl Into<String>, parallel: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            parallel,
            ..Default::default()
        }
    }

    /// Task with a `seq` step list
    pub fn with_seq(name: impl Into<String>, seq: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            seq,
            ..Default::default()
        }
    }

    /// The first non-empty step list, in `cmd`, `parallel`, `seq` order
    pub fn step_spec(&self) -> &[Step] {
        [&self.cmd, &self.parallel, &self.seq]
            .into_iter()
            .find(|steps| !steps.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Short description of the task's steps: `first (+N)`
    pub fn summary(&self) -> String {
        let steps = self.step_spec();
        match steps {
            [] => String::new(),
            [only] => only.display_name().to_string(),
            [first, rest @ ..] => format!("{} (+{})", first.display_name(), rest.len()),
        }
    }
}

/// How a combo runs its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComboMode {
    Parallel,
    #[default]
    Sequential,
}

impl fmt::Display for ComboMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboMode::Parallel => write!(f, "parallel"),
            ComboMode::Sequential => write!(f, "sequential"),
        }
    }
}

impl FromStr for ComboMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "sequential" => Ok(ComboMode::Sequential),
            "parallel" => Ok(ComboMode::Parallel),
            other => Err(format!("invalid combo mode {other:?} (expected parallel or sequential)")),
        }
    }
}

fn deserialize_combo_mode<'de, D>(deserializer: D) -> Result<ComboMode, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(ComboMode::default()),
        Some(mode) => mode.parse().map_err(D::Error::custom),
    }
}

/// A named group of tasks triggered together
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ComboDef {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default, deserialize_with = "deserialize_combo_mode")]
    pub mode: ComboMode,

    /// Task names, in run order
    #[serde(default)]
    pub run: Vec<String>,

    #[serde(default, alias = "stop-on-fail")]
    pub stop_on_fail: Option<bool>,
}

impl ComboDef {
    pub fn new(name: impl Into<String>, mode: ComboMode, run: &[&str]) -> Self {
        Self {
            name: name.into(),
            mode,
            run: run.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Whether a failed task aborts a sequential combo (defaults to true)
    pub fn stop_on_fail(&self) -> bool {
        self.stop_on_fail.unwrap_or(true)
    }

    pub fn includes(&self, task: &str) -> bool {
        self.run.iter().any(|name| name == task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_spec_precedence() {
        let task = TaskDef::with_seq("t", vec![Step::auto("b")]);
        assert_eq!(task.step_spec(), &[Step::auto("b")]);
        assert!(TaskDef::default().step_spec().is_empty());
    }

    #[test]
    fn test_summary() {
        assert_eq!(TaskDef::with_cmd("t", vec![Step::auto("make")]).summary(), "make");
        let task = TaskDef::with_parallel("t", vec![Step::auto("lint").with_name("Lint"), Step::auto("test")]);
        assert_eq!(task.summary(), "Lint (+1)");
        assert_eq!(TaskDef::default().summary(), "");
    }

    #[test]
    fn test_combo_mode_parsing() {
        assert_eq!("Parallel".parse::<ComboMode>(), Ok(ComboMode::Parallel));
        assert_eq!(" sequential ".parse::<ComboMode>(), Ok(ComboMode::Sequential));
        assert_eq!("".parse::<ComboMode>(), Ok(ComboMode::Sequential));
        assert!("sideways".parse::<ComboMode>().is_err());
    }

    #[test]
    fn test_stop_on_fail_default() {
        let mut combo = ComboDef::new("ship", ComboMode::Sequential, &["build", "deploy"]);
        assert!(combo.stop_on_fail());
        combo.stop_on_fail = Some(false);
        assert!(!combo.stop_on_fail());
        assert!(combo.includes("deploy"));
        assert!(!combo.includes("lint"));
    }

    #[test]
    fn test_combo_deserialize() {
        let yaml = "name: ci\nkey: c\nmode: PARALLEL\nrun: [lint, test]\nstop_on_fail: false\n";
        let combo: ComboDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(combo.mode, ComboMode::Parallel);
        assert_eq!(combo.run, vec!["lint", "test"]);
        assert_eq!(combo.stop_on_fail, Some(false));

        let combo: ComboDef = serde_yaml::from_str("name: ci\nrun: [lint]\n").unwrap();
        assert_eq!(combo.mode, ComboMode::Sequential);
        assert_eq!(combo.stop_on_fail, None);
    }
}
