//! Tmux-backed session controller.
//!
//! Drives an assistant running in a named tmux session. Screens are read
//! with `tmux capture-pane` and input is sent with `tmux send-keys`, so the
//! session stays attachable from any terminal with `tmux attach -t <name>`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use forgeflow_types::ForgeflowError;

use crate::session::SessionController;

/// Paste buffer used for multi-line text.
const PASTE_BUFFER: &str = "forgeflow-paste";

/// Check whether tmux is available on the system.
pub fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A tmux session hosting an assistant CLI.
pub struct TmuxController {
    session: String,
    workdir: PathBuf,
}

impl TmuxController {
    pub fn new(session: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            session: session.into(),
            workdir: workdir.into(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a tmux command and fail on a non-zero exit status.
    fn tmux(&self, args: &[&str]) -> Result<Output, ForgeflowError> {
        let output = Command::new("tmux")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ForgeflowError::Session(format!("tmux {} failed: {e}", args[0])))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForgeflowError::Session(format!(
                "tmux {} exited with {}: {}",
                args[0],
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    /// Send key names (not literal text) to the pane.
    fn send_keys(&self, keys: &[&str]) -> Result<(), ForgeflowError> {
        let mut args = vec!["send-keys", "-t", self.session.as_str()];
        args.extend_from_slice(keys);
        self.tmux(&args).map(|_| ())
    }

    /// Run a tmux command that targets the session. `Ok(None)` when tmux
    /// reports the session (or the whole server) as gone; any other failure
    /// is a `Session` error the caller may retry.
    fn query(&self, args: &[&str]) -> Result<Option<Output>, ForgeflowError> {
        let output = Command::new("tmux")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ForgeflowError::Session(format!("tmux {} failed: {e}", args[0])))?;

        if output.status.success() {
            return Ok(Some(output));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if reports_missing_session(&stderr) {
            return Ok(None);
        }
        Err(ForgeflowError::Session(format!(
            "tmux {} exited with {}: {}",
            args[0],
            output.status,
            stderr.trim()
        )))
    }

    /// Whether tmux knows the session.
    pub fn has_session(&self) -> Result<bool, ForgeflowError> {
        Ok(self.query(&["has-session", "-t", &self.session])?.is_some())
    }

    /// Check if the tmux session exists. Any failure counts as absent.
    pub fn session_exists(&self) -> bool {
        matches!(self.has_session(), Ok(true))
    }

    /// Create the session in the working directory if it does not exist,
    /// then make sure the window is at least `min_size` (columns, rows).
    pub fn ensure_session(&self, min_size: Option<(u16, u16)>) -> Result<(), ForgeflowError> {
        if self.has_session()? {
            info!(session = %self.session, "tmux session already exists");
        } else {
            let workdir = self.workdir.to_string_lossy();
            self.tmux(&["new-session", "-d", "-s", &self.session, "-c", &workdir])?;
            info!(session = %self.session, workdir = %workdir, "created tmux session");
        }

        if let Some((cols, rows)) = min_size {
            self.ensure_window_size(cols, rows);
        }
        Ok(())
    }

    /// Current `(width, height)` of the session window.
    pub fn window_size(&self) -> Option<(u16, u16)> {
        let output = self
            .tmux(&[
                "display-message",
                "-p",
                "-t",
                &self.session,
                "#{window_width} #{window_height}",
            ])
            .ok()?;
        parse_window_size(&String::from_utf8_lossy(&output.stdout))
    }

    /// Grow the window to at least `cols` x `rows`. Failures are logged only;
    /// an undersized window degrades detection but does not stop the run.
    fn ensure_window_size(&self, cols: u16, rows: u16) {
        let current = self.window_size();
        if matches!(current, Some((w, h)) if w >= cols && h >= rows) {
            debug!(session = %self.session, ?current, "window already large enough");
            return;
        }

        let (cols_s, rows_s) = (cols.to_string(), rows.to_string());
        match self.tmux(&["resize-window", "-t", &self.session, "-x", &cols_s, "-y", &rows_s]) {
            Ok(_) => info!(session = %self.session, cols, rows, "resized tmux window"),
            Err(e) => warn!(session = %self.session, error = %e, "failed to resize tmux window"),
        }
    }

    /// Paste multi-line text as one bracketed paste so embedded line breaks
    /// are not taken as Enter presses.
    fn paste(&self, text: &str) -> Result<(), ForgeflowError> {
        self.tmux(&["set-buffer", "-b", PASTE_BUFFER, "--", text])?;
        self.tmux(&["paste-buffer", "-d", "-p", "-b", PASTE_BUFFER, "-t", &self.session])
            .map(|_| ())
    }

    /// PID of the process running in the session's active pane. `Ok(None)`
    /// once the pane or the session is gone.
    fn pane_pid(&self) -> Result<Option<i32>, ForgeflowError> {
        let Some(output) = self.query(&[
            "display-message",
            "-p",
            "-t",
            &self.session,
            "#{pane_dead} #{pane_pid}",
        ])?
        else {
            return Ok(None);
        };
        Ok(parse_pane_status(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SessionController for TmuxController {
    fn capture(&self, styled: bool) -> Result<String, ForgeflowError> {
        let mut args = vec!["capture-pane", "-p"];
        if styled {
            args.push("-e");
        }
        args.extend_from_slice(&["-t", self.session.as_str()]);
        let output = self.tmux(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn send_text(&self, text: &str) -> Result<(), ForgeflowError> {
        if text.contains('\n') {
            return self.paste(text);
        }
        self.tmux(&["send-keys", "-t", &self.session, "-l", "--", text])
            .map(|_| ())
    }

    fn send_confirm(&self) -> Result<(), ForgeflowError> {
        self.send_keys(&["C-m"])
    }

    fn send_cancel(&self) -> Result<(), ForgeflowError> {
        self.send_keys(&["Escape"])
    }

    fn send_delete(&self, count: u32) -> Result<(), ForgeflowError> {
        if count == 0 {
            return Ok(());
        }
        let keys = vec!["C-h"; count as usize];
        self.send_keys(&keys)
    }

    fn is_alive(&self) -> Result<bool, ForgeflowError> {
        if !self.has_session()? {
            return Ok(false);
        }
        match self.pane_pid()? {
            // EPERM still means the process exists.
            Some(pid) => Ok(!matches!(
                signal::kill(Pid::from_raw(pid), None),
                Err(Errno::ESRCH)
            )),
            None => Ok(false),
        }
    }
}

/// Parse `"<width> <height>"` from `display-message`.
fn parse_window_size(out: &str) -> Option<(u16, u16)> {
    let mut parts = out.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Whether tmux's stderr says the target session or server does not exist,
/// as opposed to a command that failed for some other reason.
fn reports_missing_session(stderr: &str) -> bool {
    const MISSING: &[&str] = &[
        "can't find session",
        "session not found",
        "can't find pane",
        "no server running",
        "No such file or directory",
    ];
    MISSING.iter().any(|marker| stderr.contains(marker))
}

/// Parse `"<pane_dead> <pane_pid>"`; `None` when the pane is dead.
fn parse_pane_status(out: &str) -> Option<i32> {
    let mut parts = out.split_whitespace();
    let dead = parts.next()?;
    if dead == "1" {
        return None;
    }
    parts.next()?.parse().ok()
}
