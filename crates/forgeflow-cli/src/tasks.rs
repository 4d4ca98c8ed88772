//! Built-in task rule sets.
//!
//! A task turns the assistant loose on one long-running goal (fix the test
//! suite, raise coverage, work through a checklist) and stops once the
//! assistant reports success. Each task is a plain list of declarative
//! rules, parameterized by an optional `{task}_config.json` in the workdir.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use forgeflow_types::{Condition, RuleActionConfig, RuleConfig, TaskConfig};

/// Tasks shipped with forgeflow.
pub const BUILTIN_TASKS: &[&str] = &["fix_tests", "improve_coverage", "task_planner"];

/// Marker the `fix_tests` prompt asks the assistant to print when done.
const TESTS_PASSED_INDICATOR: &str = "[TESTS_PASSED]";

/// Marker the `task_planner` prompt asks for once the checklist is empty.
const ALL_TASKS_DONE: &str = "All tasks have been completed.";

const FAILURE_INDICATORS: &[&str] = &[
    "test failed",
    "failed test:",
    "failed tests:",
    "tests failed",
    "failure:",
    "error:",
    "assertionerror",
    "pytest failed",
    "unittest failed",
];

const DEFAULT_FIX_PROMPT: &str = "Please analyze the test failures and fix the issues in the code. \
Make sure to re-run the tests after each fix to verify they pass.";

/// Read `{task}_config.json` from `workdir`, or the defaults when absent.
pub fn load_task_config(task: &str, workdir: &Path) -> Result<TaskConfig> {
    let path = workdir.join(format!("{task}_config.json"));
    if !path.exists() {
        debug!(path = %path.display(), "no task config file, using defaults");
        return Ok(TaskConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read task config: {}", path.display()))?;
    let config = TaskConfig::from_json(&content)
        .with_context(|| format!("invalid task config: {}", path.display()))?;
    info!(path = %path.display(), "loaded task config");
    Ok(config)
}

/// Rules for a built-in task, or `None` if `task` is not one.
pub fn task_rules(task: &str, config: &TaskConfig) -> Option<Vec<RuleConfig>> {
    match task {
        "fix_tests" => Some(fix_tests_rules(config)),
        "improve_coverage" => Some(improve_coverage_rules(config)),
        "task_planner" => Some(task_planner_rules(config)),
        _ => None,
    }
}

fn icontains(text: &str) -> Condition {
    Condition::Contains {
        text: text.into(),
        ignore_case: true,
    }
}

fn send(command: impl Into<String>) -> RuleActionConfig {
    RuleActionConfig::Send {
        command: command.into(),
    }
}

/// True unless the text is only the echo of one of our own instructions.
fn not_echoed(phrases: &[String]) -> Condition {
    Condition::Not {
        condition: Box::new(Condition::Any {
            conditions: phrases.iter().map(|p| icontains(p)).collect(),
        }),
    }
}

fn fix_tests_prompt() -> String {
    format!(
        "
Test Case Fixing Task:
1. Identify the failing tests from the output
2. Analyze the cause of each failure:
   - For assertion errors, check the expected vs actual values
   - For runtime errors, examine the stack trace to find the issue
   - For import errors, verify module paths and dependencies
3. Fix the test cases or implementation code as needed:
   - Correct assertion logic
   - Fix implementation bugs
   - Handle edge cases properly
4. Re-run tests to verify fixes
5. Ensure all tests pass before continuing
6. If tests are still failing after several attempts, consider if there's
   a deeper architectural issue

When all tests have passed, respond with \"{TESTS_PASSED_INDICATOR}\" as the last line of your output.
"
    )
}

pub fn fix_tests_rules(config: &TaskConfig) -> Vec<RuleConfig> {
    let echoed = vec![
        format!("respond with \"{TESTS_PASSED_INDICATOR}\""),
        format!("respond with '{TESTS_PASSED_INDICATOR}'"),
    ];
    let fix_prompt = config
        .fix_test_cases_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_FIX_PROMPT.to_string());

    vec![
        RuleConfig::new(
            "all tests passed",
            Condition::All {
                conditions: vec![icontains(TESTS_PASSED_INDICATOR), not_echoed(&echoed)],
            },
            RuleActionConfig::Terminate,
        ),
        RuleConfig::new(
            "test failures on screen",
            Condition::All {
                conditions: vec![
                    Condition::Any {
                        conditions: FAILURE_INDICATORS.iter().map(|i| icontains(i)).collect(),
                    },
                    Condition::NotContains {
                        text: "task completed".into(),
                        ignore_case: true,
                    },
                    not_echoed(&echoed),
                ],
            },
            send(fix_prompt),
        ),
        RuleConfig::new("fix tests", Condition::Always, send(fix_tests_prompt())),
    ]
}

fn improve_coverage_prompt(target: u32) -> String {
    format!(
        "
Test Coverage Improvement Task:
1. Analyze current test coverage report:
   - Identify which files/modules have low coverage
   - Find specific lines or branches that are not covered
2. Prioritize areas for improvement:
   - Focus on critical business logic first
   - Address complex conditional branches
   - Cover error handling paths
3. Write additional test cases to cover these paths:
   - Create unit tests for uncovered functions
   - Add test cases for edge cases and error conditions
   - Use parameterized tests for data-driven scenarios
4. Aim for {target}% coverage
5. Run tests and verify improved coverage
6. Reassess and continue improving until target is reached
"
    )
}

pub fn improve_coverage_rules(config: &TaskConfig) -> Vec<RuleConfig> {
    let target = config.target_coverage;
    vec![
        RuleConfig::new(
            "coverage target reached",
            Condition::CoverageAtLeast { target },
            RuleActionConfig::Terminate,
        ),
        RuleConfig::new(
            "coverage below target",
            Condition::CoverageBelow { threshold: target },
            send(improve_coverage_prompt(target)),
        ),
        RuleConfig::new(
            "improve coverage",
            Condition::Always,
            send(improve_coverage_prompt(target)),
        ),
    ]
}

fn task_planner_prompt(todo_file: &str) -> String {
    format!(
        "
Task Planning Task:
1. Check the TODO file ({todo_file}) to see the list of tasks
2. Identify the first incomplete task
3. Work on completing that task:
   - Follow any specific instructions in the task description
   - Ensure code quality and testing standards
   - Make sure the implementation meets requirements
4. When the task is complete, mark it as completed in the TODO file
5. Commit your changes with an appropriate message
6. Move on to the next task

If your project has specific standards or guidelines, please check and follow them.

If you've completed the current task, respond with \"Task completed\" and
wait for further instructions.

If you've completed ALL tasks in the TODO file, respond with \"{ALL_TASKS_DONE}\"
"
    )
}

pub fn task_planner_rules(config: &TaskConfig) -> Vec<RuleConfig> {
    let all_done_echoes = vec![
        format!("return the message: \"{ALL_TASKS_DONE}\""),
        format!("return the message: '{ALL_TASKS_DONE}'"),
        format!("respond with \"{ALL_TASKS_DONE}\""),
        format!("respond with '{ALL_TASKS_DONE}'"),
    ];
    let completed_echoes = vec![
        "respond with \"task completed\"".to_string(),
        "respond with 'task completed'".to_string(),
        "say \"task completed\"".to_string(),
        "say 'task completed'".to_string(),
    ];

    vec![
        RuleConfig::new(
            "all tasks completed",
            Condition::All {
                conditions: vec![
                    Condition::Contains {
                        text: ALL_TASKS_DONE.into(),
                        ignore_case: false,
                    },
                    not_echoed(&all_done_echoes),
                ],
            },
            RuleActionConfig::Terminate,
        ),
        RuleConfig::new(
            "task completed",
            Condition::All {
                conditions: vec![
                    Condition::Any {
                        conditions: config
                            .task_completion_indicators
                            .iter()
                            .map(|i| icontains(i))
                            .collect(),
                    },
                    not_echoed(&completed_echoes),
                ],
            },
            send(config.next_task_prompt.clone()),
        ),
        RuleConfig::new(
            "next task",
            Condition::Always,
            send(task_planner_prompt(&config.todo_file)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use forgeflow_pilot::rules::{Action, RulePolicy};

    use super::*;

    fn policy(rules: Vec<RuleConfig>) -> RulePolicy {
        RulePolicy::from_configs(&rules).unwrap()
    }

    #[test]
    fn every_builtin_task_ends_with_catch_all() {
        let config = TaskConfig::default();
        for task in BUILTIN_TASKS {
            let rules = task_rules(task, &config).unwrap();
            assert!(rules.last().unwrap().is_catch_all(), "{task}");
        }
        assert!(task_rules("unknown", &config).is_none());
    }

    #[test]
    fn fix_tests_stops_on_indicator() {
        let policy = policy(fix_tests_rules(&TaskConfig::default()));
        let (action, _) = policy.evaluate("ran 12 tests\n[TESTS_PASSED]\n> ").unwrap();
        assert_eq!(*action, Action::Terminate);
    }

    #[test]
    fn fix_tests_ignores_its_own_instruction() {
        let policy = policy(fix_tests_rules(&TaskConfig::default()));
        let screen = "When all tests have passed, respond with \"[TESTS_PASSED]\" as the last line";
        let (action, description) = policy.evaluate(screen).unwrap();
        assert!(matches!(action, Action::Send(_)));
        assert_eq!(description, Some("fix tests"));
    }

    #[test]
    fn fix_tests_reacts_to_failures() {
        let mut config = TaskConfig::default();
        config.fix_test_cases_prompt = Some("fix them".into());
        let policy = policy(fix_tests_rules(&config));
        let (action, _) = policy.evaluate("FAILED tests: test_parse").unwrap();
        assert_eq!(*action, Action::Send("fix them".into()));
    }

    #[test]
    fn coverage_task_uses_target() {
        let config = TaskConfig {
            target_coverage: 90,
            ..Default::default()
        };
        let policy = policy(improve_coverage_rules(&config));

        let (action, _) = policy.evaluate("TOTAL coverage: 92%").unwrap();
        assert_eq!(*action, Action::Terminate);

        let (action, description) = policy.evaluate("TOTAL coverage: 85%").unwrap();
        assert_eq!(description, Some("coverage below target"));
        match action {
            Action::Send(prompt) => assert!(prompt.contains("Aim for 90% coverage")),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn planner_terminates_when_all_done() {
        let policy = policy(task_planner_rules(&TaskConfig::default()));
        let (action, _) = policy.evaluate("All tasks have been completed.\n> ").unwrap();
        assert_eq!(*action, Action::Terminate);
    }

    #[test]
    fn planner_moves_to_next_task() {
        let policy = policy(task_planner_rules(&TaskConfig::default()));
        let (action, _) = policy.evaluate("Task completed.\n> ").unwrap();
        assert_eq!(
            *action,
            Action::Send("Please proceed with the next task in the TODO list.".into())
        );
    }

    #[test]
    fn planner_prompt_names_todo_file() {
        let config = TaskConfig {
            todo_file: "PLAN.md".into(),
            ..Default::default()
        };
        let policy = policy(task_planner_rules(&config));
        let (action, _) = policy.evaluate("> ").unwrap();
        match action {
            Action::Send(prompt) => assert!(prompt.contains("(PLAN.md)")),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn missing_task_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_task_config("fix_tests", dir.path()).unwrap();
        assert_eq!(config, TaskConfig::default());
    }

    #[test]
    fn task_config_read_from_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("improve_coverage_config.json"),
            r#"{"target_coverage": 95}"#,
        )
        .unwrap();
        let config = load_task_config("improve_coverage", dir.path()).unwrap();
        assert_eq!(config.target_coverage, 95);
    }
}
