//! Usage command - fetch once and print.

use anyhow::{Context, Result};
use copilotbar_core::{UsagePayload, render};
use copilotbar_fetch::UsageClient;
use copilotbar_store::{CredentialStore, SettingsStore, default_usage_cache_path, save_json};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{Cli, OutputFormat};

/// JSON output for the usage command.
#[derive(Debug, Serialize)]
struct UsageOutput<'a> {
    display: &'a str,
    percent: u8,
    level: &'static str,
    used: u64,
    limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u64>,
    billing_cycle_end: String,
}

/// Runs the usage command.
pub async fn run(settings: &SettingsStore, cli: &Cli) -> Result<()> {
    let current = settings.get().await;
    let store = CredentialStore::open(current.credential_backend);
    let credential = store.get().context(
        "No token stored. Run `copilotbar login` or `copilotbar token set <TOKEN>` first",
    )?;

    let client = super::usage_client(&current)?;
    debug!(url = %client.url(), "Fetching usage");
    let usage = client
        .fetch_usage(&credential)
        .await
        .context("Failed to fetch usage")?;

    if let Err(e) = save_json(&default_usage_cache_path(), &usage).await {
        warn!(error = %e, "Failed to cache usage");
    }

    let display = render(usage.percentage(), current.display_options());
    match cli.format {
        OutputFormat::Text => print_text(&display, &usage),
        OutputFormat::Json => super::print_json(&UsageOutput {
            display: &display,
            percent: usage.percentage(),
            level: usage.level().as_str(),
            used: usage.premium_requests_used,
            limit: usage.premium_requests_limit,
            remaining: usage.remaining(),
            billing_cycle_end: usage.billing_cycle_end.to_rfc3339(),
        })?,
    }

    Ok(())
}

fn print_text(display: &str, usage: &UsagePayload) {
    println!("{display}");
    println!("Premium requests: {}", usage.detail());
    match usage.remaining() {
        Some(remaining) => println!("Remaining:        {remaining}"),
        None => println!("Remaining:        unlimited"),
    }
    println!(
        "Billing cycle:    ends {}",
        usage.billing_cycle_end.format("%Y-%m-%d")
    );
}
