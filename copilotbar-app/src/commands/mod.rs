//! CLI command implementations.

pub mod config;
pub mod display;
pub mod login;
pub mod run;
pub mod token;
pub mod usage;

use anyhow::{Context, Result};
use copilotbar_fetch::{GitHubDeviceFlowApi, GitHubUsageClient};
use copilotbar_store::Settings;
use serde::Serialize;

/// Builds the usage client, honouring the endpoint override.
pub(crate) fn usage_client(settings: &Settings) -> Result<GitHubUsageClient> {
    let client = match &settings.usage_url {
        Some(url) => GitHubUsageClient::with_url(url)
            .with_context(|| format!("Invalid usage_url: {url}"))?,
        None => GitHubUsageClient::new().context("Failed to build HTTP client")?,
    };
    Ok(client)
}

/// Builds the device flow endpoints, honouring the client id override.
pub(crate) fn device_api(settings: &Settings) -> Result<GitHubDeviceFlowApi> {
    let api = match &settings.client_id {
        Some(id) => GitHubDeviceFlowApi::with_client_id(id.clone()),
        None => GitHubDeviceFlowApi::new(),
    };
    api.context("Failed to build HTTP client")
}

/// Prints a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
