//! Token command - manage the stored credential.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use copilotbar_core::Credential;
use copilotbar_store::{CredentialStore, SettingsStore};
use serde_json::json;

use crate::{Cli, OutputFormat};

/// Arguments for the token command.
#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub action: TokenAction,
}

/// Token subcommands.
#[derive(Subcommand)]
pub enum TokenAction {
    /// Store a personal access or OAuth token.
    Set {
        /// The token (leading/trailing whitespace is trimmed).
        token: String,
    },

    /// Remove the stored token.
    Clear,

    /// Show whether a token is stored.
    Status,
}

/// Runs the token command.
pub async fn run(args: &TokenArgs, settings: &SettingsStore, cli: &Cli) -> Result<()> {
    let backend = settings.get().await.credential_backend;
    let mut store = CredentialStore::open(backend);

    match &args.action {
        TokenAction::Set { token } => {
            let credential = Credential::new(token).context("Token is empty")?;
            let hint = credential.hint();
            store
                .set(credential)
                .with_context(|| format!("Failed to store token in {backend}"))?;
            match cli.format {
                OutputFormat::Text => println!("Token {hint} stored in {backend}."),
                OutputFormat::Json => super::print_json(&json!({
                    "stored": true,
                    "token": hint,
                    "backend": backend,
                }))?,
            }
        }
        TokenAction::Clear => {
            store
                .clear()
                .with_context(|| format!("Failed to remove token from {backend}"))?;
            match cli.format {
                OutputFormat::Text => println!("Token removed from {backend}."),
                OutputFormat::Json => super::print_json(&json!({
                    "stored": false,
                    "backend": backend,
                }))?,
            }
        }
        TokenAction::Status => {
            let hint = store.get().map(|c| c.hint());
            match cli.format {
                OutputFormat::Text => match &hint {
                    Some(hint) => println!("Token {hint} stored in {backend}."),
                    None => println!("No token stored ({backend})."),
                },
                OutputFormat::Json => super::print_json(&json!({
                    "stored": hint.is_some(),
                    "token": hint,
                    "backend": backend,
                }))?,
            }
        }
    }

    Ok(())
}
