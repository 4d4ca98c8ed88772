//! Declarative rule definitions.
//!
//! Rules are plain data: a [`Condition`] over captured screen text and a
//! [`RuleActionConfig`]. The pilot crate compiles them into an ordered
//! policy. Rule files are TOML documents with a `[[rules]]` array:
//!
//! ```toml
//! [[rules]]
//! description = "stop once the checklist is done"
//! when = { type = "contains", text = "All tasks have been completed." }
//! action = { type = "terminate" }
//!
//! [[rules]]
//! when = { type = "always" }
//! action = { type = "send", command = "continue" }
//! ```

use serde::{Deserialize, Serialize};

use crate::ForgeflowError;

/// A predicate over captured text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Always true. Conventionally the last rule of a policy.
    Always,
    /// Substring match.
    Contains {
        text: String,
        #[serde(default)]
        ignore_case: bool,
    },
    /// Negated substring match.
    NotContains {
        text: String,
        #[serde(default)]
        ignore_case: bool,
    },
    /// Regular expression search anywhere in the text.
    Regex { pattern: String },
    /// Every nested condition holds.
    All { conditions: Vec<Condition> },
    /// At least one nested condition holds.
    Any { conditions: Vec<Condition> },
    /// The nested condition does not hold.
    Not { condition: Box<Condition> },
    /// A reported `coverage: N%` figure is below `threshold`.
    CoverageBelow { threshold: u32 },
    /// A reported `coverage: N%` figure is at least `target`.
    CoverageAtLeast { target: u32 },
}

/// What to do when a rule's condition holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleActionConfig {
    /// Inject `command` followed by a confirmation keystroke.
    Send { command: String },
    /// Stop the automation loop.
    Terminate,
}

/// One entry of an ordered rule list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleConfig {
    /// Shown in logs when the rule matches.
    #[serde(default)]
    pub description: String,
    pub when: Condition,
    pub action: RuleActionConfig,
}

impl RuleConfig {
    pub fn new(description: impl Into<String>, when: Condition, action: RuleActionConfig) -> Self {
        Self {
            description: description.into(),
            when,
            action,
        }
    }

    /// Whether this rule matches every input.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.when, Condition::Always)
    }
}

/// A rule file on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl RuleFile {
    /// Parse a rule file from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ForgeflowError> {
        toml::from_str(content).map_err(|e| ForgeflowError::Config(e.to_string()))
    }

    /// Serialize the rules to a TOML string.
    pub fn to_toml(&self) -> Result<String, ForgeflowError> {
        toml::to_string_pretty(self).map_err(|e| ForgeflowError::Config(e.to_string()))
    }
}
