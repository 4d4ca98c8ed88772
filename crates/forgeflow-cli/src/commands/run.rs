//! `forgeflow run`: start (or attach to) a tmux session and drive the
//! assistant in it until the rules say stop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use forgeflow_pilot::adapter::CliAdapter;
use forgeflow_pilot::adapters::{create_adapter, DEFAULT_CLI_TYPE};
use forgeflow_pilot::automation;
use forgeflow_pilot::clock::{CancelToken, Clock, SystemClock};
use forgeflow_pilot::screen::ScreenCapture;
use forgeflow_pilot::session::SessionController;
use forgeflow_pilot::tmux::{tmux_available, TmuxController};
use forgeflow_types::{ForgeflowConfig, PilotConfig};

use crate::rules_loader::{build_policy, RuleSources};

/// Pause before checking whether the assistant is already on screen.
const STARTUP_SETTLE: Duration = Duration::from_secs(1);

/// Time given to a freshly started assistant to draw its interface.
const STARTUP_WAIT: Duration = Duration::from_secs(5);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// tmux session name
    #[arg(long)]
    pub session: Option<String>,

    /// Working directory for the tmux session
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Command that starts the assistant CLI
    #[arg(long)]
    pub ai_cmd: Option<String>,

    /// Assistant CLI type (see `forgeflow adapters`)
    #[arg(long)]
    pub cli_type: Option<String>,

    /// Poll interval in seconds
    #[arg(long)]
    pub poll: Option<f64>,

    /// Seconds without progress before recovery runs
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Consecutive unrecognized screens before recovery runs (0 disables)
    #[arg(long)]
    pub max_unknown: Option<u32>,

    /// Project name used to find a project rule file
    #[arg(long)]
    pub project: Option<String>,

    /// Built-in task (fix_tests, improve_coverage, task_planner)
    #[arg(long)]
    pub task: Option<String>,

    /// Extra TOML rule file appended after task or project rules
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

/// Flags merged over the configuration file.
#[derive(Debug)]
struct Settings {
    session: String,
    workdir: PathBuf,
    ai_cmd: String,
    cli_type: String,
    project: Option<String>,
    task: Option<String>,
    rules: Option<PathBuf>,
    pilot: PilotConfig,
}

impl Settings {
    fn resolve(args: RunArgs, file: &ForgeflowConfig) -> Result<Self> {
        let session = args
            .session
            .or_else(|| file.session.clone())
            .context("--session is required (or set `session` in the config file)")?;
        let workdir = args
            .workdir
            .or_else(|| file.workdir.clone())
            .context("--workdir is required (or set `workdir` in the config file)")?;
        let ai_cmd = args
            .ai_cmd
            .or_else(|| file.ai_cmd.clone())
            .context("--ai-cmd is required (or set `ai_cmd` in the config file)")?;

        if !workdir.is_dir() {
            bail!("--workdir is not a directory: {}", workdir.display());
        }

        let mut pilot = file.pilot.clone();
        if let Some(poll) = args.poll {
            pilot.poll_interval_secs = poll;
        }
        if let Some(timeout) = args.timeout {
            pilot.stall_timeout_secs = timeout;
        }
        if let Some(max_unknown) = args.max_unknown {
            pilot.max_unknown_polls = max_unknown;
        }
        pilot.validate()?;

        Ok(Self {
            session,
            workdir,
            ai_cmd,
            cli_type: args
                .cli_type
                .or_else(|| file.cli_type.clone())
                .unwrap_or_else(|| DEFAULT_CLI_TYPE.into()),
            project: args.project.or_else(|| file.project.clone()),
            task: args.task.or_else(|| file.task.clone()),
            rules: args.rules,
            pilot,
        })
    }
}

/// Run the `forgeflow run` command.
pub fn run(args: RunArgs, file: &ForgeflowConfig) -> Result<()> {
    let settings = Settings::resolve(args, file)?;

    let mut adapter = create_adapter(&settings.cli_type, &file.adapter)?;
    let policy = build_policy(&RuleSources {
        cli_type: &settings.cli_type,
        task: settings.task.as_deref(),
        project: settings.project.as_deref(),
        rules_file: settings.rules.as_deref(),
        workdir: &settings.workdir,
        fallback_command: &settings.pilot.fallback_command,
    })?;

    if !tmux_available() {
        bail!("tmux is not installed or not on PATH");
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to set ctrl-c handler")?;

    let controller = TmuxController::new(&settings.session, &settings.workdir);
    controller.ensure_session(adapter.min_window_size())?;

    let clock = SystemClock;
    if !start_assistant(&controller, &adapter, &settings.ai_cmd, &clock, &cancel)? {
        info!("cancelled during startup");
        return Ok(());
    }

    info!(
        session = %settings.session,
        attach = %format!("tmux attach -t {}", settings.session),
        "driving assistant"
    );
    let report = automation::run(
        &controller,
        &mut adapter,
        &policy,
        &settings.pilot,
        &clock,
        &cancel,
    )?;

    info!(
        outcome = %report.outcome,
        polls = report.stats.polls,
        commands = report.stats.commands_sent,
        confirms = report.stats.confirms_sent,
        recoveries = report.stats.recoveries,
        "run finished"
    );
    Ok(())
}

/// Start the assistant unless its interface is already on screen.
///
/// Returns `false` if cancelled while waiting.
fn start_assistant<A: CliAdapter + ?Sized>(
    controller: &TmuxController,
    adapter: &A,
    ai_cmd: &str,
    clock: &SystemClock,
    cancel: &CancelToken,
) -> Result<bool> {
    if !clock.sleep(STARTUP_SETTLE, cancel) {
        return Ok(false);
    }

    let styled = adapter.wants_styled_capture();
    let screen = ScreenCapture::new(controller.capture(styled)?, styled);
    if adapter.is_program_alive(&screen.classification_text()) {
        info!(adapter = adapter.name(), "assistant already running");
        return Ok(true);
    }

    info!(command = ai_cmd, "starting assistant");
    controller.send_text(ai_cmd)?;
    controller.send_confirm()?;
    Ok(clock.sleep(STARTUP_WAIT, cancel))
}
