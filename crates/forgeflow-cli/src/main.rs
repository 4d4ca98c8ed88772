mod commands;
mod notify;
mod rules_loader;
mod tasks;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use forgeflow_types::{ForgeflowConfig, CONFIG_FILENAME, LOG_FILENAME};

/// ForgeFlow -- keep an AI coding assistant working in tmux.
#[derive(Parser, Debug)]
#[command(name = "forgeflow", version, about)]
struct Cli {
    /// Configuration file (defaults to ./forgeflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Disable console logging
    #[arg(long, global = true)]
    no_console: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive an assistant in a tmux session until its rules say stop
    Run(commands::run::RunArgs),

    /// Watch a session and send a desktop notification when a task finishes
    Monitor(commands::monitor::MonitorArgs),

    /// List supported assistant CLI types
    Adapters,
}

/// Load `--config`, or `forgeflow.toml` in the current directory if present.
fn load_config(path: Option<&Path>) -> Result<ForgeflowConfig> {
    match path {
        Some(path) => ForgeflowConfig::load(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => {
            let default = Path::new(CONFIG_FILENAME);
            if default.is_file() {
                ForgeflowConfig::load(default)
                    .with_context(|| format!("failed to load config: {CONFIG_FILENAME}"))
            } else {
                Ok(ForgeflowConfig::default())
            }
        }
    }
}

/// Install the console and log-file subscribers.
fn init_logging(level: &str, log_file: Option<&Path>, console: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {level}"))?;

    let console_layer = console.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let level = cli
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .unwrap_or("info");

    match cli.command {
        Commands::Run(args) => {
            let log_file = cli
                .log_file
                .or_else(|| config.log_file.clone())
                .unwrap_or_else(|| PathBuf::from(LOG_FILENAME));
            init_logging(level, Some(&log_file), !cli.no_console)?;
            commands::run::run(args, &config)
        }
        Commands::Monitor(args) => {
            let log_file = cli.log_file.or_else(|| config.log_file.clone());
            init_logging(level, log_file.as_deref(), !cli.no_console)?;
            commands::monitor::run(args, &config)
        }
        Commands::Adapters => commands::adapters::run(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("forgeflow: fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
