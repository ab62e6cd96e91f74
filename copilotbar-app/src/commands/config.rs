//! Config command - inspect configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use copilotbar_fetch::device_flow::COPILOT_CLIENT_ID;
use copilotbar_fetch::usage::DEFAULT_USAGE_URL;
use copilotbar_store::{
    CONFIG_DIR_ENV, SettingsStore, default_config_dir, default_credentials_path,
    default_usage_cache_path,
};

use crate::{Cli, OutputFormat};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration.
    Show,

    /// Show configuration paths.
    Path,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, settings: &SettingsStore, cli: &Cli) -> Result<()> {
    match &args.action {
        ConfigAction::Show => show_config(settings, cli).await,
        ConfigAction::Path => show_paths(settings, cli),
    }
}

async fn show_config(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let settings = store.get().await;

    match cli.format {
        OutputFormat::Text => {
            println!("CopilotBar Configuration");
            println!("{}", "─".repeat(40));
            println!();
            println!("Show bar:           {}", settings.show_bar);
            println!("Show percent:       {}", settings.show_percent);
            println!(
                "Refresh interval:   {}s",
                settings.refresh_interval().as_secs()
            );
            println!("Credential backend: {}", settings.credential_backend);
            println!(
                "Usage URL:          {}",
                settings.usage_url.as_deref().unwrap_or(DEFAULT_USAGE_URL)
            );
            println!(
                "OAuth client id:    {}",
                settings.client_id.as_deref().unwrap_or(COPILOT_CLIENT_ID)
            );
            println!("Log level:          {}", settings.log_level);
        }
        OutputFormat::Json => super::print_json(&settings)?,
    }

    Ok(())
}

fn show_paths(store: &SettingsStore, cli: &Cli) -> Result<()> {
    let config_dir = default_config_dir();
    let credentials = default_credentials_path();
    let usage_cache = default_usage_cache_path();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration Paths");
            println!("{}", "─".repeat(40));
            println!();
            println!("Config dir:       {}", config_dir.display());
            println!("Settings file:    {}", store.path().display());
            println!("Credentials file: {}", credentials.display());
            println!("Usage cache:      {}", usage_cache.display());
            println!();
            println!("Override the directory with ${CONFIG_DIR_ENV}.");
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "config_dir": config_dir.display().to_string(),
                "settings_file": store.path().display().to_string(),
                "credentials_file": credentials.display().to_string(),
                "usage_cache": usage_cache.display().to_string(),
            });
            super::print_json(&paths)?;
        }
    }

    Ok(())
}
