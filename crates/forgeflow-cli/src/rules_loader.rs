//! Assemble the rule policy for a run.
//!
//! Order: CLI-type rules, then the task rules (`--task`) or else the project
//! rule file (`--project`), then an explicit `--rules` file, and finally the
//! fallback catch-all unless the list already ends with one.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use forgeflow_pilot::rules::{cli_type_rules, RulePolicy};
use forgeflow_types::{RuleConfig, RuleFile};

use crate::tasks;

/// Inputs that decide which rules are loaded.
#[derive(Debug)]
pub struct RuleSources<'a> {
    pub cli_type: &'a str,
    pub task: Option<&'a str>,
    pub project: Option<&'a str>,
    pub rules_file: Option<&'a Path>,
    pub workdir: &'a Path,
    pub fallback_command: &'a str,
}

/// Directory searched for project rule files after the workdir.
pub fn projects_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".forgeflow").join("projects")
}

/// Read a TOML rule file.
pub fn load_rule_file(path: &Path) -> Result<Vec<RuleConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rule file: {}", path.display()))?;
    let file = RuleFile::from_toml(&content)
        .with_context(|| format!("invalid rule file: {}", path.display()))?;
    Ok(file.rules)
}

/// Locate `{project}_rules.toml` or `{project}.toml` in the given directories.
pub fn find_project_rules(project: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let names = [format!("{project}_rules.toml"), format!("{project}.toml")];
    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Collect the rule list in evaluation order, without the fallback.
pub fn collect_rules(sources: &RuleSources<'_>) -> Result<Vec<RuleConfig>> {
    let mut rules = cli_type_rules(sources.cli_type);
    if !rules.is_empty() {
        info!(cli_type = sources.cli_type, count = rules.len(), "loaded CLI-type rules");
    }

    if let Some(task) = sources.task {
        let config = tasks::load_task_config(task, sources.workdir)?;
        let Some(task_rules) = tasks::task_rules(task, &config) else {
            bail!(
                "unknown task: {task}. Built-in tasks: {}",
                tasks::BUILTIN_TASKS.join(", ")
            );
        };
        info!(task, count = task_rules.len(), "loaded task rules");
        rules.extend(task_rules);
    } else if let Some(project) = sources.project {
        let dirs = [sources.workdir.to_path_buf(), projects_dir()];
        let path = find_project_rules(project, &dirs).with_context(|| {
            format!(
                "no rule file for project {project:?} (looked for {project}_rules.toml \
                 and {project}.toml in {} and {})",
                dirs[0].display(),
                dirs[1].display()
            )
        })?;
        let project_rules = load_rule_file(&path)?;
        info!(project, path = %path.display(), count = project_rules.len(), "loaded project rules");
        rules.extend(project_rules);
    }

    if let Some(path) = sources.rules_file {
        let extra = load_rule_file(path)?;
        info!(path = %path.display(), count = extra.len(), "loaded rule file");
        rules.extend(extra);
    }

    Ok(rules)
}

/// Build the run's policy, compiling every rule and appending the fallback.
pub fn build_policy(sources: &RuleSources<'_>) -> Result<RulePolicy> {
    let rules = collect_rules(sources)?;
    let policy = RulePolicy::from_configs(&rules)
        .context("failed to compile rules")?
        .with_fallback(sources.fallback_command);
    info!(rules = policy.len(), "rule policy ready");
    Ok(policy)
}
