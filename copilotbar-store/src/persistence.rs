//! File persistence helpers.
//!
//! Handles loading and saving state to disk with owner-only permissions.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "COPILOTBAR_CONFIG_DIR";

// ============================================================================
// Default Paths
// ============================================================================

/// Returns the default configuration directory.
///
/// - `$COPILOTBAR_CONFIG_DIR` if set
/// - macOS: `~/Library/Application Support/CopilotBar`
/// - Linux: `~/.config/copilotbar`
/// - Windows: `%APPDATA%\copilotbar`
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support").join("CopilotBar"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir()
            .map(|c| c.join("copilotbar"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Returns the default settings file path.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

/// Returns the default file-backend credential path.
pub fn default_credentials_path() -> PathBuf {
    default_config_dir().join("credentials.json")
}

/// Returns the path of the last fetched usage, kept for previews.
pub fn default_usage_cache_path() -> PathBuf {
    default_config_dir().join("last_usage.json")
}

// ============================================================================
// Owner-only Files
// ============================================================================

/// Mode for files holding settings or tokens.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Mode for directories we create.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Restricts `path` to its owner.
#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = %format!("{mode:o}"), "Restricted permissions");
    Ok(())
}

/// Writes `contents` to a sibling temp file, then renames it over `path`.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, contents).await?;
    #[cfg(unix)]
    restrict(&staging, FILE_MODE).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}

/// Makes sure the directory holding `path` exists.
async fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if tokio::fs::try_exists(dir).await? {
        return Ok(());
    }

    debug!(path = %dir.display(), "Creating config directory");
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    restrict(dir, DIR_MODE).await?;
    Ok(())
}

/// Blocking counterpart of [`ensure_parent`] and [`write_atomic`].
///
/// The file ends up `0600` on Unix even if it existed with wider permissions.
pub(crate) fn write_private_sync(path: &Path, contents: &str) -> Result<(), StoreError> {
    use std::io::Write;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            #[cfg(unix)]
            restrict_sync(dir, DIR_MODE)?;
        }
    }

    let staging = path.with_extension("json.tmp");
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options.open(&staging)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    // A leftover staging file keeps its old mode.
    #[cfg(unix)]
    restrict_sync(&staging, FILE_MODE)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_sync(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

// ============================================================================
// JSON Files
// ============================================================================

/// Saves data to a JSON file with secure permissions.
///
/// Creates the parent directory if needed, writes atomically
/// (temp file + rename), and sets restrictive permissions on Unix.
///
/// # Errors
///
/// Returns an error if serialization or any file operation fails.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    debug!(path = %path.display(), "Saving JSON file");

    let json = serde_json::to_string_pretty(data)?;
    ensure_parent(path).await?;
    write_atomic(path, &json).await?;

    debug!(path = %path.display(), "JSON file saved");
    Ok(())
}

/// Loads data from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    debug!(path = %path.display(), "Loading JSON file");

    let content = tokio::fs::read_to_string(path).await?;
    let data = serde_json::from_str(&content)?;

    Ok(data)
}

/// Loads data from a JSON file, returning the default if missing or corrupt.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load_json(path).await {
        Ok(data) => data,
        Err(e) => {
            if !matches!(e, StoreError::Io(_)) {
                warn!(path = %path.display(), error = %e, "Failed to load, using defaults");
            }
            T::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
