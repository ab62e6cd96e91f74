//! User preferences store.
//!
//! Manages user settings and their persistence.

use copilotbar_core::DisplayOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credentials::BackendKind;
use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Default usage refresh interval.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Shortest allowed usage refresh interval.
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Show the block bar in the tray string.
    pub show_bar: bool,

    /// Show the percentage in the tray string.
    pub show_percent: bool,

    /// Seconds between usage refreshes.
    pub refresh_interval_secs: u64,

    /// Where the bearer credential is kept.
    pub credential_backend: BackendKind,

    /// Usage endpoint override.
    pub usage_url: Option<String>,

    /// OAuth client id override.
    pub client_id: Option<String>,

    /// Log level.
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_bar: true,
            show_percent: true,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            credential_backend: BackendKind::default(),
            usage_url: None,
            client_id: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Refresh interval, never shorter than one minute.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(MIN_REFRESH_INTERVAL_SECS))
    }

    /// The persisted display toggles.
    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions::new(self.show_bar, self.show_percent)
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Error level logging.
    Error,
    /// Warning level logging.
    Warn,
    /// Info level logging.
    #[default]
    Info,
    /// Debug level logging.
    Debug,
    /// Trace level logging.
    Trace,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Persistent settings store.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store with default settings.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be loaded from disk.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from a path.
    ///
    /// A missing file yields defaults; a corrupt one is logged and also
    /// yields defaults.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be loaded from disk.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = if path.exists() {
            info!(path = %path.display(), "Loading settings");
            load_json(&path).await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            })
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };

        Ok(Self::with_settings(path, settings))
    }

    /// Settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings in memory. Returns true if anything changed.
    pub async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().await;
        let before = settings.clone();
        f(&mut settings);
        *settings != before
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await.clone();
        save_json(&self.path, &settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    // ========================================================================
    // Display Toggles
    // ========================================================================

    /// Gets the display toggles.
    pub async fn display_options(&self) -> DisplayOptions {
        self.settings.read().await.display_options()
    }

    /// Sets and persists the bar toggle.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn set_show_bar(&self, value: bool) -> Result<(), StoreError> {
        let changed = self.update(|s| s.show_bar = value).await;
        debug!(value, changed, "Set bar toggle");
        self.save().await
    }

    /// Sets and persists the percent toggle.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn set_show_percent(&self, value: bool) -> Result<(), StoreError> {
        let changed = self.update(|s| s.show_percent = value).await;
        debug!(value, changed, "Set percent toggle");
        self.save().await
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
