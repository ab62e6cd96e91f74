//! Login command - foreground GitHub device flow.

use anyhow::{Context, Result, bail};
use copilotbar_fetch::DeviceAuthFlow;
use copilotbar_store::{CredentialStore, SettingsStore};
use serde_json::json;
use tracing::info;

use crate::{Cli, OutputFormat};

/// Runs the login command.
pub async fn run(settings: &SettingsStore, cli: &Cli) -> Result<()> {
    let current = settings.get().await;
    let flow = DeviceAuthFlow::new(super::device_api(&current)?);

    let session = flow.start_auth_flow().await?;
    match cli.format {
        OutputFormat::Text => {
            println!("Open {} and enter the code:", session.verification_uri);
            println!();
            println!("    {}", session.user_code);
            println!();
            println!("Waiting for authorization (Ctrl-C to cancel)...");
        }
        OutputFormat::Json => super::print_json(&json!({
            "verification_uri": session.verification_uri,
            "user_code": session.user_code,
            "expires_in": session.expires_in.as_secs(),
        }))?,
    }

    let handle = flow.complete_auth_flow(session);
    let cancel = handle.cancellation_token();
    let credential = tokio::select! {
        result = handle.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            bail!("Login cancelled");
        }
    };

    let mut store = CredentialStore::open(current.credential_backend);
    store
        .set(credential.clone())
        .with_context(|| format!("Failed to store token in {}", current.credential_backend))?;
    info!(backend = store.backend_name(), "Token stored");

    match cli.format {
        OutputFormat::Text => println!(
            "Logged in. Token {} stored in {}.",
            credential.hint(),
            current.credential_backend
        ),
        OutputFormat::Json => super::print_json(&json!({
            "logged_in": true,
            "token": credential.hint(),
            "backend": current.credential_backend,
        }))?,
    }

    Ok(())
}
