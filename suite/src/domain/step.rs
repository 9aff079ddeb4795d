//! Step definitions and step-list parsing

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// How a step's value is interpreted
///
/// `Auto` is resolved at execution time against the task registry, so the
/// same step can be a command in one run and a task reference in the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepKind {
    #[default]
    Auto,
    Command,
    Task,
}

/// One element of a task's step list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Literal command text or a task name
    pub value: String,
    /// Optional display label
    pub name: Option<String>,
    pub kind: StepKind,
}

impl Step {
    pub fn new(value: impl Into<String>, kind: StepKind) -> Self {
        Self {
            value: value.into(),
            name: None,
            kind,
        }
    }

    pub fn auto(value: impl Into<String>) -> Self {
        Self::new(value, StepKind::Auto)
    }

    pub fn command(value: impl Into<String>) -> Self {
        Self::new(value, StepKind::Command)
    }

    pub fn task(value: impl Into<String>) -> Self {
        Self::new(value, StepKind::Task)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label if set, otherwise the trimmed value
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.value.trim(),
        }
    }
}

/// Execution mode of a task's step list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Single unwrapped command, no step identifiers
    None,
    Sequential,
    Parallel,
}

impl StepMode {
    /// Tag used inside step identifiers
    pub fn tag(self) -> &'static str {
        match self {
            StepMode::None => "step",
            StepMode::Sequential => "seq",
            StepMode::Parallel => "par",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "step" => Some(StepMode::None),
            "seq" => Some(StepMode::Sequential),
            "par" => Some(StepMode::Parallel),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSteps {
    One(String),
    Many(Vec<RawStep>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Plain(String),
    Detailed(StepSpec),
}

#[derive(Deserialize)]
struct StepSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    task: Option<String>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        match raw {
            RawStep::Plain(value) => Ok(Step::auto(value.trim())),
            RawStep::Detailed(spec) => {
                let name = spec.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
                let step = match (spec.cmd, spec.task) {
                    (Some(_), Some(_)) => return Err("step cannot define both cmd and task".to_string()),
                    (Some(cmd), None) => Step::command(cmd.trim()),
                    (None, Some(task)) => Step::task(task.trim()),
                    (None, None) => return Err("step must be a string, {cmd: ...}, or {task: ...}".to_string()),
                };
                Ok(Step { name, ..step })
            }
        }
    }
}

/// Deserialize a step list from a string, or a list of strings and step maps
pub fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<Step>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawSteps>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(RawSteps::One(value)) => {
            let value = value.trim();
            if value.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![Step::auto(value)])
            }
        }
        Some(RawSteps::Many(items)) => items
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCommands {
    One(String),
    Many(Vec<String>),
}

/// Deserialize a command list from a string or a list of strings
pub fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawCommands>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(RawCommands::One(cmd)) => {
            let cmd = cmd.trim();
            if cmd.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![cmd.to_string()])
            }
        }
        Some(RawCommands::Many(cmds)) => Ok(cmds.into_iter().map(|c| c.trim().to_string()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_steps")]
        steps: Vec<Step>,
        #[serde(default, deserialize_with = "deserialize_commands")]
        init: Vec<String>,
    }

    fn parse(yaml: &str) -> Result<Holder, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_scalar_step_list() {
        let holder = parse("steps: '  make build  '").unwrap();
        assert_eq!(holder.steps, vec![Step::auto("make build")]);
    }

    #[test]
    fn test_null_and_missing_step_list() {
        assert!(parse("steps: ~").unwrap().steps.is_empty());
        assert!(parse("init: []").unwrap().steps.is_empty());
    }

    #[test]
    fn test_mixed_step_list() {
        let yaml = r#"
steps:
  - lint
  - cmd: cargo test
    name: tests
  - task: deploy
"#;
        let holder = parse(yaml).unwrap();
        assert_eq!(holder.steps.len(), 3);
        assert_eq!(holder.steps[0], Step::auto("lint"));
        assert_eq!(holder.steps[1], Step::command("cargo test").with_name("tests"));
        assert_eq!(holder.steps[2], Step::task("deploy"));
    }

    #[test]
    fn test_step_with_cmd_and_task_rejected() {
        let err = parse("steps:\n  - cmd: a\n    task: b\n").err().unwrap();
        assert!(err.to_string().contains("both cmd and task"));
    }

    #[test]
    fn test_step_map_without_value_rejected() {
        let err = parse("steps:\n  - name: nothing\n").err().unwrap();
        assert!(err.to_string().contains("step must be a string"));
    }

    #[test]
    fn test_command_list_forms() {
        assert_eq!(parse("init: 'source .env'").unwrap().init, vec!["source .env"]);
        assert_eq!(
            parse("init:\n  - ' export A=1 '\n  - export B=2\n").unwrap().init,
            vec!["export A=1", "export B=2"]
        );
        assert!(parse("init: ''").unwrap().init.is_empty());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Step::auto(" make ").display_name(), "make");
        assert_eq!(Step::auto("make").with_name("Build").display_name(), "Build");
        assert_eq!(Step::auto("make").with_name("  ").display_name(), "make");
    }

    #[test]
    fn test_mode_tags() {
        for mode in [StepMode::None, StepMode::Sequential, StepMode::Parallel] {
            assert_eq!(StepMode::from_tag(mode.tag()), Some(mode));
        }
        assert_eq!(StepMode::from_tag("bogus"), None);
    }
}
