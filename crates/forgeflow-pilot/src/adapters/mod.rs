//! Built-in classification adapters for supported assistant CLIs.
//!
//! - [`gemini::GeminiAdapter`]: Gemini CLI bordered input box
//! - [`codex::CodexAdapter`]: Codex composer bar and key-hint footer
//! - [`claude::ClaudeCodeAdapter`]: Claude Code input line and spinner
//! - [`generic::GenericAdapter`]: regex-based configurable adapter

pub mod claude;
pub mod codex;
pub mod gemini;
pub mod generic;

use forgeflow_types::{AdapterPatterns, ForgeflowError};

use crate::adapter::CliAdapter;

/// Factory keys accepted by [`create_adapter`], in display order.
const SUPPORTED: &[&str] = &["gemini", "codex", "claude_code", "generic"];

/// Key used when none is configured.
pub const DEFAULT_CLI_TYPE: &str = "gemini";

/// The closed set of supported adapters.
pub enum Adapter {
    Gemini(gemini::GeminiAdapter),
    Codex(codex::CodexAdapter),
    ClaudeCode(claude::ClaudeCodeAdapter),
    Generic(generic::GenericAdapter),
}

impl Adapter {
    fn inner(&self) -> &dyn CliAdapter {
        match self {
            Adapter::Gemini(a) => a,
            Adapter::Codex(a) => a,
            Adapter::ClaudeCode(a) => a,
            Adapter::Generic(a) => a,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CliAdapter {
        match self {
            Adapter::Gemini(a) => a,
            Adapter::Codex(a) => a,
            Adapter::ClaudeCode(a) => a,
            Adapter::Generic(a) => a,
        }
    }
}

impl CliAdapter for Adapter {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn is_awaiting_input(&self, text: &str) -> bool {
        self.inner().is_awaiting_input(text)
    }

    fn pending_input(&self, text: &str) -> Option<String> {
        self.inner().pending_input(text)
    }

    fn is_processing(&self, text: &str) -> bool {
        self.inner().is_processing(text)
    }

    fn is_program_alive(&self, text: &str) -> bool {
        self.inner().is_program_alive(text)
    }

    fn wants_styled_capture(&self) -> bool {
        self.inner().wants_styled_capture()
    }

    fn min_window_size(&self) -> Option<(u16, u16)> {
        self.inner().min_window_size()
    }

    fn rewrite_command(&mut self, command: &str) -> String {
        self.inner_mut().rewrite_command(command)
    }
}

/// Normalize a CLI type key: trimmed, lowercase, empty meaning the default.
pub fn normalize_cli_type(cli_type: &str) -> String {
    let key = cli_type.trim().to_lowercase();
    if key.is_empty() {
        DEFAULT_CLI_TYPE.to_string()
    } else {
        key
    }
}

/// Create an adapter from its configuration key.
///
/// Keys are matched case-insensitively after trimming; an empty key selects
/// Gemini. `patterns` only configures the `generic` adapter.
pub fn create_adapter(cli_type: &str, patterns: &AdapterPatterns) -> Result<Adapter, ForgeflowError> {
    let adapter = match normalize_cli_type(cli_type).as_str() {
        "gemini" => Adapter::Gemini(gemini::GeminiAdapter::new()),
        "codex" => Adapter::Codex(codex::CodexAdapter::new()),
        "claude_code" => Adapter::ClaudeCode(claude::ClaudeCodeAdapter::new()),
        "generic" => Adapter::Generic(generic::GenericAdapter::new(patterns)?),
        _ => {
            return Err(ForgeflowError::Config(format!(
                "unsupported CLI type: {cli_type}. Supported: {}",
                SUPPORTED.join(", ")
            )))
        }
    };
    tracing::debug!(adapter = adapter.name(), "created classification adapter");
    Ok(adapter)
}

/// The keys [`create_adapter`] accepts.
pub fn list_supported() -> &'static [&'static str] {
    SUPPORTED
}
