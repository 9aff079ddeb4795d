//! Starter config scaffolding

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::DEFAULT_CONFIG_FILE;

/// Write a starter config to `path` (default `.suite.yml`)
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn run_init(path: Option<&Path>) -> Result<PathBuf> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    debug!(path = %path.display(), "run_init: called");

    if path.exists() {
        bail!("config already exists at {}", path.display());
    }

    let title = std::env::current_dir()
        .ok()
        .and_then(|cwd| cwd.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();

    fs::write(&path, default_config_template(&title)?)
        .context(format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Created starter config");
    Ok(path)
}

/// Starter config text with the given title
pub fn default_config_template(title: &str) -> Result<String> {
    let title = match title.trim() {
        "" => "suite",
        title => title,
    };
    let title = serde_yaml::to_string(title).context("Failed to encode config title")?;
    let title = title.trim_end();

    Ok(format!(
        r#"title: {title}

tasks:
  - name: format
    key: f
    cmd: bin/format

  - name: test
    key: t
    cmd: bin/test

  - name: checks
    key: a
    parallel:
      - bin/lint
      - bin/test

  - name: deploy
    key: p
    cmd:
      - bin/check
      - git push

combos:
  - name: ship
    key: s
    mode: sequential
    run: [format, checks, deploy]
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_template_passes_validation() {
        let text = default_config_template("my project").unwrap();
        let config = Config::from_yaml(&text, Path::new(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.title, "my project");
        assert_eq!(config.tasks.len(), 4);
        assert_eq!(config.combos[0].run, vec!["format", "checks", "deploy"]);
    }

    #[test]
    fn test_blank_title_defaults() {
        assert!(default_config_template("  ").unwrap().starts_with("title: suite\n"));
    }

    #[test]
    fn test_awkward_titles_survive_yaml() {
        for title in ["it's: \"odd\" #1", "tab\there", "123", "true", "- dash"] {
            let text = default_config_template(title).unwrap();
            let config = Config::from_yaml(&text, Path::new(DEFAULT_CONFIG_FILE)).unwrap();
            assert_eq!(config.title, title);
        }
    }

    #[test]
    fn test_run_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".suite.yml");

        let written = run_init(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert!(fs::read_to_string(&path).unwrap().contains("tasks:"));

        let err = run_init(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
