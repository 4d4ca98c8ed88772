//! CLI command implementations for the `forgeflow` binary.

pub mod adapters;
pub mod monitor;
pub mod run;
