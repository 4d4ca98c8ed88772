//! Core types shared across all forgeflow crates.
//!
//! Defines the error taxonomy, run configuration, and declarative rule
//! definitions used by the automation loop and the CLI.

pub mod config;
pub mod error;
pub mod rule_config;

pub use config::{
    AdapterPatterns, ForgeflowConfig, PilotConfig, RecoveryConfig, RetryConfig, TaskConfig,
    CONFIG_FILENAME, LOG_FILENAME,
};
pub use error::ForgeflowError;
pub use rule_config::{Condition, RuleActionConfig, RuleConfig, RuleFile};
