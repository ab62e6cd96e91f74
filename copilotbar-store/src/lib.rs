// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CopilotBar` Store
//!
//! Persistence for the `CopilotBar` tray utility.
//!
//! This crate provides:
//!
//! - **`CredentialStore`**: the single active bearer credential, backed by
//!   the OS keychain, a `0600` JSON file, or memory
//! - **`SettingsStore`**: display toggles and configuration with persistence
//! - **Persistence**: File I/O helpers for JSON data
//!
//! ## Usage
//!
//! ```ignore
//! use copilotbar_store::{CredentialStore, SettingsStore};
//!
//! let settings = SettingsStore::load_default().await?;
//! let credentials = CredentialStore::open(settings.get().await.credential_backend);
//!
//! if let Some(credential) = credentials.get() {
//!     println!("Token: {}", credential.hint());
//! }
//! ```

pub mod credentials;
pub mod error;
pub mod persistence;
pub mod settings_store;

pub use credentials::{
    BackendKind, CredentialBackend, CredentialStore, FileBackend, KeychainBackend, MemoryBackend,
};
pub use error::StoreError;
pub use persistence::{
    CONFIG_DIR_ENV, default_config_dir, default_credentials_path, default_settings_path,
    default_usage_cache_path, load_json, load_json_or_default, save_json,
};
pub use settings_store::{LogLevel, Settings, SettingsStore};
