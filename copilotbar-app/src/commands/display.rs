//! Display command - change and preview the tray text.

use anyhow::Result;
use clap::{Args, ValueEnum};
use copilotbar_core::{UsagePayload, render};
use copilotbar_store::{SettingsStore, default_usage_cache_path, load_json};
use serde_json::json;
use tracing::debug;

use crate::{Cli, OutputFormat};

/// On/off switch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    /// Shown.
    On,
    /// Hidden.
    Off,
}

impl Toggle {
    fn is_on(self) -> bool {
        self == Toggle::On
    }
}

/// Arguments for the display command.
#[derive(Args)]
pub struct DisplayArgs {
    /// Show or hide the five-block bar.
    #[arg(long)]
    pub bar: Option<Toggle>,

    /// Show or hide the percentage.
    #[arg(long)]
    pub percent: Option<Toggle>,
}

/// Runs the display command.
pub async fn run(args: &DisplayArgs, settings: &SettingsStore, cli: &Cli) -> Result<()> {
    if let Some(bar) = args.bar {
        settings.set_show_bar(bar.is_on()).await?;
    }
    if let Some(percent) = args.percent {
        settings.set_show_percent(percent.is_on()).await?;
    }

    let options = settings.display_options().await;
    let percent = last_known_percentage().await;
    let preview = render(percent, options);

    match cli.format {
        OutputFormat::Text => {
            println!("Bar:     {}", if options.show_bar { "on" } else { "off" });
            println!("Percent: {}", if options.show_percent { "on" } else { "off" });
            println!("Preview: [{preview}]");
            if options.is_hidden() {
                println!("Both parts are off; the tray entry is blank.");
            }
        }
        OutputFormat::Json => super::print_json(&json!({
            "show_bar": options.show_bar,
            "show_percent": options.show_percent,
            "percent": percent,
            "preview": preview,
            "hidden": options.is_hidden(),
        }))?,
    }

    Ok(())
}

/// Percentage from the last `usage` run, 0 if there was none.
async fn last_known_percentage() -> u8 {
    match load_json::<UsagePayload>(&default_usage_cache_path()).await {
        Ok(usage) => usage.percentage(),
        Err(e) => {
            debug!(error = %e, "No cached usage");
            0
        }
    }
}
