//! `forgeflow monitor`: watch a session and notify when the assistant
//! finishes a task. Never types into the session.

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use forgeflow_pilot::adapters::{create_adapter, DEFAULT_CLI_TYPE};
use forgeflow_pilot::clock::{CancelToken, SystemClock};
use forgeflow_pilot::monitor::run_monitor;
use forgeflow_pilot::tmux::{tmux_available, TmuxController};
use forgeflow_types::ForgeflowConfig;

use crate::notify::DesktopNotifier;

#[derive(Args, Debug, Default)]
pub struct MonitorArgs {
    /// tmux session to watch
    #[arg(long)]
    pub session: Option<String>,

    /// Assistant CLI type (see `forgeflow adapters`)
    #[arg(long)]
    pub cli_type: Option<String>,

    /// Poll interval in seconds
    #[arg(long)]
    pub poll: Option<f64>,
}

/// Run the `forgeflow monitor` command.
pub fn run(args: MonitorArgs, file: &ForgeflowConfig) -> Result<()> {
    let session = args
        .session
        .or_else(|| file.session.clone())
        .context("--session is required (or set `session` in the config file)")?;
    let cli_type = args
        .cli_type
        .or_else(|| file.cli_type.clone())
        .unwrap_or_else(|| DEFAULT_CLI_TYPE.into());
    let mut pilot = file.pilot.clone();
    if let Some(poll) = args.poll {
        pilot.poll_interval_secs = poll;
    }

    if !tmux_available() {
        bail!("tmux is not installed or not on PATH");
    }
    let adapter = create_adapter(&cli_type, &file.adapter)?;

    let workdir = file.workdir.clone().unwrap_or_else(|| ".".into());
    let controller = TmuxController::new(&session, workdir);
    if !controller.session_exists() {
        bail!("tmux session not found: {session}");
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to set ctrl-c handler")?;

    let stats = run_monitor(
        &controller,
        &adapter,
        &DesktopNotifier,
        &session,
        &pilot,
        &SystemClock,
        &cancel,
    )?;
    info!(
        polls = stats.polls,
        tasks = stats.tasks_started,
        notifications = stats.notifications,
        "monitor stopped"
    );
    Ok(())
}
