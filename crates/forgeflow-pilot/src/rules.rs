//! Ordered condition/action rules deciding what to send at an idle prompt.
//!
//! A [`RulePolicy`] is built once per run, from declarative [`RuleConfig`]s
//! or from predicates constructed in code, and is immutable afterwards.
//! Evaluation is first-match-wins. A policy is expected to end with a
//! catch-all rule; matching nothing is reported as
//! [`ForgeflowError::PolicyMisconfigured`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use forgeflow_types::{Condition, ForgeflowError, RuleActionConfig, RuleConfig};

/// What the loop does when a rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Inject this text, then the confirmation keystroke.
    Send(String),
    /// Stop the automation loop.
    Terminate,
}

impl From<&RuleActionConfig> for Action {
    fn from(config: &RuleActionConfig) -> Self {
        match config {
            RuleActionConfig::Send { command } => Action::Send(command.clone()),
            RuleActionConfig::Terminate => Action::Terminate,
        }
    }
}

/// A pure test over captured text.
#[derive(Clone)]
pub enum Predicate {
    Always,
    Contains { text: String, ignore_case: bool },
    Regex(Regex),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    CoverageBelow(u32),
    CoverageAtLeast(u32),
    /// A predicate supplied in code. It must not depend on anything but its input.
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => write!(f, "Always"),
            Predicate::Contains { text, ignore_case } => f
                .debug_struct("Contains")
                .field("text", text)
                .field("ignore_case", ignore_case)
                .finish(),
            Predicate::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Predicate::All(preds) => f.debug_tuple("All").field(preds).finish(),
            Predicate::Any(preds) => f.debug_tuple("Any").field(preds).finish(),
            Predicate::Not(pred) => f.debug_tuple("Not").field(pred).finish(),
            Predicate::CoverageBelow(n) => f.debug_tuple("CoverageBelow").field(n).finish(),
            Predicate::CoverageAtLeast(n) => f.debug_tuple("CoverageAtLeast").field(n).finish(),
            Predicate::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Predicate {
    /// Compile a declarative condition. Fails only on an invalid regex.
    pub fn compile(condition: &Condition) -> Result<Self, ForgeflowError> {
        let compile_all = |conditions: &[Condition]| -> Result<Vec<Predicate>, ForgeflowError> {
            conditions.iter().map(Predicate::compile).collect()
        };

        Ok(match condition {
            Condition::Always => Predicate::Always,
            Condition::Contains { text, ignore_case } => Predicate::Contains {
                text: text.clone(),
                ignore_case: *ignore_case,
            },
            Condition::NotContains { text, ignore_case } => {
                Predicate::Not(Box::new(Predicate::Contains {
                    text: text.clone(),
                    ignore_case: *ignore_case,
                }))
            }
            Condition::Regex { pattern } => Predicate::Regex(Regex::new(pattern).map_err(|e| {
                ForgeflowError::Config(format!("invalid rule regex {pattern:?}: {e}"))
            })?),
            Condition::All { conditions } => Predicate::All(compile_all(conditions)?),
            Condition::Any { conditions } => Predicate::Any(compile_all(conditions)?),
            Condition::Not { condition } => Predicate::Not(Box::new(Predicate::compile(condition)?)),
            Condition::CoverageBelow { threshold } => Predicate::CoverageBelow(*threshold),
            Condition::CoverageAtLeast { target } => Predicate::CoverageAtLeast(*target),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Contains { text: needle, ignore_case } => {
                if *ignore_case {
                    text.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    text.contains(needle.as_str())
                }
            }
            Predicate::Regex(re) => re.is_match(text),
            Predicate::All(preds) => preds.iter().all(|p| p.matches(text)),
            Predicate::Any(preds) => preds.iter().any(|p| p.matches(text)),
            Predicate::Not(pred) => !pred.matches(text),
            Predicate::CoverageBelow(threshold) => coverage_below(text, *threshold),
            Predicate::CoverageAtLeast(target) => coverage_at_least(text, *target),
            Predicate::Custom(f) => f(text),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }
}

fn coverage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"coverage[:\s]+(\d+)%?").unwrap())
}

/// The most recent `coverage: N%` figure in the text, if any.
pub fn reported_coverage(text: &str) -> Option<u32> {
    coverage_re()
        .captures_iter(&text.to_lowercase())
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .last()
}

fn coverage_below(text: &str, threshold: u32) -> bool {
    if let Some(coverage) = reported_coverage(text) {
        return coverage < threshold;
    }
    let lower = text.to_lowercase();
    !lower.contains(&format!("coverage: {threshold}%"))
        && (lower.contains("coverage below threshold") || lower.contains("coverage:"))
}

fn coverage_at_least(text: &str, target: u32) -> bool {
    if let Some(coverage) = reported_coverage(text) {
        return coverage >= target;
    }
    let lower = text.to_lowercase();
    lower.contains(&format!("coverage: {target}%")) || lower.contains("coverage target reached")
}

/// One entry of a policy.
#[derive(Debug, Clone)]
pub struct Rule {
    pub description: String,
    pub predicate: Predicate,
    pub action: Action,
}

impl Rule {
    pub fn new(description: impl Into<String>, predicate: Predicate, action: Action) -> Self {
        Self {
            description: description.into(),
            predicate,
            action,
        }
    }

    /// A rule with an in-code predicate.
    pub fn custom<F>(description: impl Into<String>, predicate: F, action: Action) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::new(description, Predicate::Custom(Arc::new(predicate)), action)
    }

    pub fn from_config(config: &RuleConfig) -> Result<Self, ForgeflowError> {
        Ok(Self::new(
            config.description.clone(),
            Predicate::compile(&config.when)?,
            Action::from(&config.action),
        ))
    }
}

/// An ordered, immutable, first-match-wins rule list.
#[derive(Debug, Clone, Default)]
pub struct RulePolicy {
    rules: Vec<Rule>,
}

impl RulePolicy {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Compile declarative rules in order.
    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self, ForgeflowError> {
        let rules = configs
            .iter()
            .map(Rule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Append an always-true rule sending `command`, unless the policy
    /// already ends with a catch-all.
    pub fn with_fallback(mut self, command: &str) -> Self {
        if !self.ends_with_catch_all() {
            self.rules.push(Rule::new(
                "fallback",
                Predicate::Always,
                Action::Send(command.to_string()),
            ));
        }
        self
    }

    pub fn ends_with_catch_all(&self) -> bool {
        self.rules.last().is_some_and(|r| r.predicate.is_always())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Return the action of the first rule matching `text`, with that
    /// rule's description when it has one.
    pub fn evaluate(&self, text: &str) -> Result<(&Action, Option<&str>), ForgeflowError> {
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(text))
            .map(|rule| {
                let description = Some(rule.description.as_str()).filter(|d| !d.is_empty());
                (&rule.action, description)
            })
            .ok_or_else(|| {
                ForgeflowError::PolicyMisconfigured(format!(
                    "none of {} rules matched; the policy must end with an `always` rule",
                    self.rules.len()
                ))
            })
    }
}

/// Built-in rules for an assistant CLI, evaluated before task or project rules.
pub fn cli_type_rules(cli_type: &str) -> Vec<RuleConfig> {
    match cli_type {
        "gemini" => gemini_rules(),
        "codex" => codex_rules(),
        _ => Vec::new(),
    }
}

fn contains(text: &str) -> Condition {
    Condition::Contains {
        text: text.into(),
        ignore_case: false,
    }
}

fn send(command: &str) -> RuleActionConfig {
    RuleActionConfig::Send {
        command: command.into(),
    }
}

/// Gemini API failures: an invalid-parameter error poisons the conversation
/// and needs `/clear`; other API errors are retried with `continue`.
pub fn gemini_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::new(
            "gemini invalid parameter error",
            contains("✕ [API Error: 400 <400> InternalError.Algo.InvalidParameter"),
            send("/clear"),
        ),
        RuleConfig::new(
            "gemini request terminated",
            contains("✕ [API Error: terminated]"),
            send("continue"),
        ),
        RuleConfig::new("gemini api error", contains("API Error"), send("continue")),
    ]
}

/// Codex context overflow asks for `/compact`; the usage limit ends the run.
pub fn codex_rules() -> Vec<RuleConfig> {
    let not_compacted = Condition::Not {
        condition: Box::new(contains("Compact task completed")),
    };
    vec![
        RuleConfig::new(
            "codex context window exceeded",
            Condition::All {
                conditions: vec![
                    Condition::Regex {
                        pattern: "■ stream disconnected before completion: Your input exceeds the context window of this model".into(),
                    },
                    not_compacted.clone(),
                ],
            },
            send("/compact"),
        ),
        RuleConfig::new(
            "codex stream error: context window exceeded",
            Condition::All {
                conditions: vec![
                    Condition::Regex {
                        pattern: r"stream error: stream disconnected before completion:\s+Your\s+input\s+exceeds\s+the\s+context\s+window\s+of\s+this\s+model".into(),
                    },
                    not_compacted,
                ],
            },
            send("/compact"),
        ),
        RuleConfig::new(
            "codex usage limit reached",
            contains("You've hit your usage limit"),
            RuleActionConfig::Terminate,
        ),
    ]
}
