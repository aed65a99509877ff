//! # squadrun-cli
//!
//! Binary entry point for squadrun.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging setup and configuration loading
//! - Entry point to the pass scheduler
//! - Session file inspection via `squadrun sessions`

mod sessions;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use squadrun_core::{ApiClient, HttpTransport, Scheduler, SquadApi, SquadConfig};
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Config file picked up from the working directory when `-c` is not given.
const DEFAULT_CONFIG: &str = "squadrun.yml";

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// squadrun - unattended reward collection for squad game sessions
#[derive(Parser, Debug)]
#[command(name = "squadrun", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file [default: squadrun.yml, if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process every session, wait out the cooldown, repeat (default)
    Run(RunArgs),

    /// Parse the session file and list what each line holds
    Sessions(SessionsArgs),
}

/// Arguments for the run subcommand.
#[derive(Parser, Debug, Default)]
struct RunArgs {
    /// Override the session file
    #[arg(long)]
    sessions: Option<PathBuf>,

    /// Override the wait between passes, in seconds
    #[arg(long)]
    cooldown: Option<u64>,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

/// Arguments for the sessions subcommand.
#[derive(Parser, Debug, Default)]
struct SessionsArgs {
    /// Override the session file
    #[arg(long)]
    sessions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.color);

    match cli.command {
        Some(Commands::Run(args)) => run_command(cli.config.as_deref(), args).await,
        Some(Commands::Sessions(args)) => sessions_command(cli.config.as_deref(), cli.color, args),
        None => run_command(cli.config.as_deref(), RunArgs::default()).await,
    }
}

/// INFO and DEBUG go to stdout, WARN and ERROR to stderr. `RUST_LOG`
/// overrides the level picked by `--verbose`.
fn init_logging(verbose: bool, color: ColorMode) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(color.should_use_colors())
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout))
        .init();
}

/// An explicit path must exist; the default is optional.
fn load_config(explicit: Option<&Path>) -> Result<SquadConfig> {
    match explicit {
        Some(path) => SquadConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => SquadConfig::from_file(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG}")),
        None => {
            debug!("No {DEFAULT_CONFIG} found, using defaults");
            Ok(SquadConfig::default())
        }
    }
}

async fn run_command(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(path) = args.sessions {
        config.scheduler.sessions_file = path;
    }
    if let Some(secs) = args.cooldown {
        config.scheduler.cooldown_secs = secs;
    }

    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }

    let transport = HttpTransport::from_config(&config.api).context("Failed to build HTTP client")?;
    let api = SquadApi::new(
        ApiClient::new(transport, config.api.pacing()),
        config.squad.clone(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handlers(&shutdown);

    let mut scheduler = Scheduler::new(api, &config).with_shutdown(shutdown);
    if args.once {
        scheduler = scheduler.with_max_passes(1);
    }

    info!(
        sessions_file = %config.scheduler.sessions_file.display(),
        squad = %config.squad.name,
        cooldown_secs = config.scheduler.cooldown_secs,
        "Starting squadrun"
    );
    let summary = scheduler.run().await;
    info!(passes = summary.passes, reason = ?summary.reason, "Stopped");

    Ok(())
}

/// Ctrl-C (and SIGTERM on Unix) lets the current session finish, then stops.
fn spawn_signal_handlers(shutdown: &Arc<AtomicBool>) {
    let on_sigint = Arc::clone(shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current session...");
            on_sigint.store(true, Ordering::SeqCst);
        }
    });

    #[cfg(unix)]
    {
        let on_sigterm = Arc::clone(shutdown);
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    warn!("SIGTERM received, finishing current session...");
                    on_sigterm.store(true, Ordering::SeqCst);
                }
                Err(e) => debug!("Could not register SIGTERM handler: {e}"),
            }
        });
    }
}

fn sessions_command(
    config_path: Option<&Path>,
    color: ColorMode,
    args: SessionsArgs,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(path) = args.sessions {
        config.scheduler.sessions_file = path;
    }
    sessions::list_sessions(&config.scheduler.sessions_file, color.should_use_colors())
}
