//! Run command - the tray loop.
//!
//! Tray text goes to stdout, one line per change. Line commands are read
//! from stdin; prompts and errors go to stderr.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use copilotbar_app::{
    AuthStatus, NoAuthServer, RefreshScheduler, SchedulerDeps, SchedulerHandle, StdoutTray,
    TraySurface, UsageState,
};
use copilotbar_store::{BackendKind, CredentialStore, SettingsStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::{Cli, OutputFormat};

/// Arguments for the run command.
#[derive(Args, Default)]
pub struct RunArgs {
    /// Prefix tray lines with the usage level when above normal.
    #[arg(long)]
    pub levels: bool,

    /// Keep tokens in memory only.
    #[arg(long)]
    pub ephemeral: bool,
}

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputCommand {
    Refresh,
    Bar(bool),
    Percent(bool),
    Token(String),
    Login,
    Logout,
    Status,
    Help,
    Quit,
}

const HELP: &str = "Commands: refresh | bar on|off | percent on|off | token <value> | login | logout | status | quit";

fn parse_switch(value: Option<&str>) -> Result<bool, String> {
    match value {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err("expected `on` or `off`".to_string()),
    }
}

/// Parses one input line; `Ok(None)` for a blank line.
fn parse_command(line: &str) -> Result<Option<InputCommand>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, Some(rest.trim())),
        None => (line, None),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "refresh" | "r" => InputCommand::Refresh,
        "bar" => InputCommand::Bar(parse_switch(rest)?),
        "percent" => InputCommand::Percent(parse_switch(rest)?),
        "token" => match rest {
            Some(value) if !value.is_empty() => InputCommand::Token(value.to_string()),
            _ => return Err("usage: token <value>".to_string()),
        },
        "login" => InputCommand::Login,
        "logout" => InputCommand::Logout,
        "status" => InputCommand::Status,
        "help" | "?" => InputCommand::Help,
        "quit" | "exit" | "q" => InputCommand::Quit,
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(command))
}

/// Runs the tray until `quit`, end of input, or Ctrl-C.
pub async fn run(args: &RunArgs, settings: SettingsStore, cli: &Cli) -> Result<()> {
    let current = settings.get().await;
    let backend = if args.ephemeral {
        BackendKind::Memory
    } else {
        current.credential_backend
    };
    let tray: Box<dyn TraySurface> = if args.levels {
        Box::new(StdoutTray::with_level())
    } else {
        Box::new(StdoutTray::new())
    };

    let deps = SchedulerDeps {
        usage_client: Arc::new(super::usage_client(&current)?),
        device_flow: Arc::new(super::device_api(&current)?),
        credentials: CredentialStore::open(backend),
        settings: Arc::new(settings),
        tray,
        auth_server: Box::new(NoAuthServer),
    };
    let (handle, task) = RefreshScheduler::spawn(deps).await;

    let mut state_rx = handle.subscribe();
    let mut reporter = Reporter::new(cli);
    reporter.report(&state_rx.borrow_and_update().clone());
    if !handle.state().has_credential {
        reporter.note("No token stored. Type `login` or `token <value>`.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("End of input");
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(InputCommand::Quit)) => break,
                    Ok(Some(command)) => apply(command, &handle, &reporter)?,
                    Ok(None) => {}
                    Err(message) => reporter.note(&message),
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                reporter.report(&state);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown();
    task.await?;
    Ok(())
}

fn apply(command: InputCommand, handle: &SchedulerHandle, reporter: &Reporter) -> Result<()> {
    match command {
        InputCommand::Refresh => handle.refresh()?,
        InputCommand::Bar(show) => handle.set_show_bar(show)?,
        InputCommand::Percent(show) => handle.set_show_percent(show)?,
        InputCommand::Token(value) => handle.save_token(value)?,
        InputCommand::Login => handle.start_login()?,
        InputCommand::Logout => handle.clear_token()?,
        InputCommand::Status => reporter.status(&handle.state())?,
        InputCommand::Help => reporter.note(HELP),
        InputCommand::Quit => {}
    }
    Ok(())
}

// ============================================================================
// Reporter
// ============================================================================

/// Writes prompts and failures to stderr, once per change.
struct Reporter {
    quiet: bool,
    format: OutputFormat,
    auth: AuthStatus,
    error: Option<String>,
}

impl Reporter {
    fn new(cli: &Cli) -> Self {
        Self {
            quiet: cli.quiet,
            format: cli.format,
            auth: AuthStatus::Idle,
            error: None,
        }
    }

    fn note(&self, message: &str) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }

    fn report(&mut self, state: &UsageState) {
        if state.auth != self.auth {
            match &state.auth {
                AuthStatus::AwaitingUser {
                    user_code,
                    verification_uri,
                } => self.note(&format!("Open {verification_uri} and enter code {user_code}")),
                AuthStatus::Failed { message } => self.note(&format!("Login failed: {message}")),
                AuthStatus::Idle | AuthStatus::Starting => {}
            }
            self.auth = state.auth.clone();
        }

        if state.error != self.error {
            if let Some(error) = &state.error {
                self.note(&format!("Usage fetch failed: {error}"));
            }
            self.error.clone_from(&state.error);
        }
    }

    fn status(&self, state: &UsageState) -> Result<()> {
        match self.format {
            OutputFormat::Json => eprintln!("{}", serde_json::to_string(state)?),
            OutputFormat::Text => {
                let usage = state
                    .usage
                    .as_ref()
                    .map_or_else(|| "no data".to_string(), |u| u.detail());
                eprintln!(
                    "token: {} | usage: {usage} | level: {} | loading: {}{}",
                    if state.has_credential { "stored" } else { "none" },
                    state.level(),
                    state.loading,
                    state
                        .error
                        .as_deref()
                        .map(|e| format!(" | error: {e}"))
                        .unwrap_or_default(),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("refresh"), Ok(Some(InputCommand::Refresh)));
        assert_eq!(parse_command("  bar off "), Ok(Some(InputCommand::Bar(false))));
        assert_eq!(parse_command("percent on"), Ok(Some(InputCommand::Percent(true))));
        assert_eq!(
            parse_command("token  ghp_abc "),
            Ok(Some(InputCommand::Token("ghp_abc".to_string())))
        );
        assert_eq!(parse_command("LOGIN"), Ok(Some(InputCommand::Login)));
        assert_eq!(parse_command("logout"), Ok(Some(InputCommand::Logout)));
        assert_eq!(parse_command("quit"), Ok(Some(InputCommand::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command("bar maybe").is_err());
        assert!(parse_command("bar").is_err());
        assert!(parse_command("token").is_err());
        assert!(parse_command("dance").is_err());
    }
}
