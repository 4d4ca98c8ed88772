//! Desktop notifications for monitor mode.
//!
//! Uses `terminal-notifier` on macOS and `notify-send` elsewhere. Both are
//! optional; a missing tool surfaces as a notifier error, which monitor mode
//! logs and moves past.

use std::process::{Command, Stdio};

use forgeflow_pilot::monitor::Notifier;
use forgeflow_types::ForgeflowError;

/// Sender id shown by macOS Notification Center.
const MACOS_SENDER: &str = "com.forge_flow.app";

/// Shells out to the platform's notification tool.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn command(title: &str, message: &str) -> Command {
        let message = format!("{message} ({})", chrono::Local::now().format("%H:%M:%S"));
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("terminal-notifier");
            cmd.args(["-title", title, "-message", &message, "-sender", MACOS_SENDER]);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.args([title, message.as_str()]);
            cmd
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), ForgeflowError> {
        let mut cmd = Self::command(title, message);
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(ForgeflowError::Io(std::io::Error::other(format!(
                "{:?} exited with {status}",
                cmd.get_program()
            ))));
        }
        Ok(())
    }
}
