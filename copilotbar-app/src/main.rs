// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `CopilotBar` - GitHub Copilot premium-request usage in your tray.
//!
//! # Examples
//!
//! ```bash
//! # Run the tray (stdout surface, commands on stdin)
//! copilotbar
//!
//! # One-off usage check
//! copilotbar usage --format json
//!
//! # Sign in with the GitHub device flow
//! copilotbar login
//!
//! # Store a personal access token
//! copilotbar token set ghp_xxx
//!
//! # Hide the bar, keep the percentage
//! copilotbar display --bar off
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use copilotbar_store::{LogLevel, SettingsStore};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{config, display, login, run, token, usage};

// ============================================================================
// CLI Definition
// ============================================================================

/// `CopilotBar` - GitHub Copilot usage tray.
#[derive(Parser)]
#[command(name = "copilotbar")]
#[command(about = "GitHub Copilot premium-request usage in your tray")]
#[command(long_about = r"
CopilotBar shows how much of your GitHub Copilot premium-request allowance
has been used this billing cycle, as a five-block bar and a percentage.

Examples:
  copilotbar                     # Run the tray
  copilotbar usage               # Fetch once and print
  copilotbar login               # GitHub device-flow login
  copilotbar token set ghp_...   # Store a token
  copilotbar display --bar off   # Percentage only
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If none, runs 'run' by default.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the tray (default if no command specified).
    Run(run::RunArgs),

    /// Fetch current usage once.
    #[command(visible_alias = "u")]
    Usage,

    /// Sign in with the GitHub device flow.
    Login,

    /// Manage the stored token.
    Token(token::TokenArgs),

    /// Change what the tray shows.
    Display(display::DisplayArgs),

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, level: LogLevel) {
    if quiet {
        return; // No logging in quiet mode
    }

    let directives = |level: &str| {
        ["copilotbar", "copilotbar_app", "copilotbar_fetch", "copilotbar_store"]
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    // RUST_LOG wins over flags and settings.
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else if verbose {
        EnvFilter::new(format!("info,{}", directives("debug")))
    } else {
        EnvFilter::new(format!("warn,{}", directives(level.as_str())))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = SettingsStore::load_default().await?;
    setup_logging(cli.verbose, cli.quiet, settings.get().await.log_level);

    let result = match &cli.command {
        Some(Commands::Run(args)) => run::run(args, settings, &cli).await,
        Some(Commands::Usage) => usage::run(&settings, &cli).await,
        Some(Commands::Login) => login::run(&settings, &cli).await,
        Some(Commands::Token(args)) => token::run(args, &settings, &cli).await,
        Some(Commands::Display(args)) => display::run(args, &settings, &cli).await,
        Some(Commands::Config(args)) => config::run(args, &settings, &cli).await,
        None => run::run(&run::RunArgs::default(), settings, &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::Error as i32);
    }

    Ok(())
}
