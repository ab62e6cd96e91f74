//! Bearer credential storage.
//!
//! [`CredentialStore`] owns the single active credential and writes it
//! through to a [`CredentialBackend`]:
//!
//! 1. **Keychain** - OS secure storage via `keyring`
//! 2. **File** - `credentials.json` in the config directory, mode `0600`
//! 3. **Memory** - nothing persisted (tests, `--ephemeral`)
//!
//! All operations are synchronous and never touch the network.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use copilotbar_core::Credential;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::StoreError;
use crate::persistence::{default_credentials_path, write_private_sync};

// ============================================================================
// Constants
// ============================================================================

/// Keychain service name.
const KEYCHAIN_SERVICE: &str = "copilotbar";

/// Keychain account name.
const KEYCHAIN_ACCOUNT: &str = "github_token";

// ============================================================================
// Backend Kind
// ============================================================================

/// Where the credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OS keychain / secret service.
    #[default]
    Keychain,
    /// Owner-only JSON file in the config directory.
    File,
    /// Process memory only.
    Memory,
}

impl BackendKind {
    /// Creates the backend for this kind with default locations.
    pub fn create(self) -> Box<dyn CredentialBackend> {
        match self {
            BackendKind::Keychain => Box::new(KeychainBackend::new()),
            BackendKind::File => Box::new(FileBackend::new(default_credentials_path())),
            BackendKind::Memory => Box::new(MemoryBackend::new()),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Keychain => write!(f, "keychain"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(BackendKind::Keychain),
            "file" => Ok(BackendKind::File),
            "memory" => Ok(BackendKind::Memory),
            other => Err(StoreError::Config(format!(
                "Unknown credential backend: {other} (expected keychain, file, or memory)"
            ))),
        }
    }
}

// ============================================================================
// Backend Trait
// ============================================================================

/// A string slot keyed by a fixed identifier.
pub trait CredentialBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Reads the stored token, `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Overwrites the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Removes the stored token. Removing a missing token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be modified.
    fn delete(&self) -> Result<(), StoreError>;
}

// ============================================================================
// Keychain Backend
// ============================================================================

/// OS keychain backend.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    service: String,
    account: String,
}

impl KeychainBackend {
    /// Creates a backend with the default service/account.
    pub fn new() -> Self {
        Self::with_entry(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
    }

    /// Creates a backend for a custom service/account.
    pub fn with_entry(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, StoreError> {
        Ok(keyring::Entry::new(&self.service, &self.account)?)
    }
}

impl Default for KeychainBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeychainBackend {
    fn name(&self) -> &'static str {
        "keychain"
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        self.entry()?.set_password(token)?;
        debug!(service = %self.service, "Token saved to keychain");
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "Token removed from keychain");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// File Backend
// ============================================================================

/// Token stored in file.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    /// The bearer token.
    access_token: String,

    /// When the token was stored.
    #[serde(default)]
    stored_at: Option<String>,
}

/// Owner-only JSON file backend.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend at the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the file path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredToken = serde_json::from_str(&content)?;
        Ok(Some(stored.access_token))
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        let stored = StoredToken {
            access_token: token.to_string(),
            stored_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        write_private_sync(&self.path, &content)?;

        debug!(path = %self.path.display(), "Token saved to file");
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Memory Backend
// ============================================================================

/// In-memory backend; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<String>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

// ============================================================================
// Credential Store
// ============================================================================

/// The single active credential, written through to a backend.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    current: Option<Credential>,
}

impl CredentialStore {
    /// Opens the store for a backend kind.
    pub fn open(kind: BackendKind) -> Self {
        Self::with_backend(kind.create())
    }

    /// Opens the store over a backend, loading any stored credential.
    ///
    /// An unreadable or blank stored value is treated as absent.
    #[instrument(skip(backend), fields(backend = backend.name()))]
    pub fn with_backend(backend: Box<dyn CredentialBackend>) -> Self {
        let current = match backend.load() {
            Ok(Some(raw)) => Credential::new(raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        };
        debug!(present = current.is_some(), "Credential store opened");
        Self { backend, current }
    }

    /// Backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the active credential.
    pub fn get(&self) -> Option<Credential> {
        self.current.clone()
    }

    /// Returns true if a credential is present.
    pub fn is_present(&self) -> bool {
        self.current.is_some()
    }

    /// Replaces the active credential.
    ///
    /// The in-memory value is replaced even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write failed.
    pub fn set(&mut self, credential: Credential) -> Result<(), StoreError> {
        let result = self.backend.save(credential.expose());
        self.current = Some(credential);
        match &result {
            Ok(()) => info!(backend = self.backend.name(), "Credential stored"),
            Err(e) => warn!(backend = self.backend.name(), error = %e, "Credential not persisted"),
        }
        result
    }

    /// Removes the active credential.
    ///
    /// The in-memory value is cleared even if the backend delete fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete failed.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.current = None;
        let result = self.backend.delete();
        match &result {
            Ok(()) => info!(backend = self.backend.name(), "Credential cleared"),
            Err(e) => warn!(backend = self.backend.name(), error = %e, "Credential not removed from storage"),
        }
        result
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.backend.name())
            .field("present", &self.current.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend whose writes always fail.
    struct BrokenBackend;

    impl CredentialBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn load(&self) -> Result<Option<String>, StoreError> {
            Err(StoreError::Keychain("locked".to_string()))
        }

        fn save(&self, _token: &str) -> Result<(), StoreError> {
            Err(StoreError::Keychain("locked".to_string()))
        }

        fn delete(&self) -> Result<(), StoreError> {
            Err(StoreError::Keychain("locked".to_string()))
        }
    }

    fn cred(value: &str) -> Credential {
        Credential::new(value).unwrap()
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let mut store = CredentialStore::with_backend(Box::new(MemoryBackend::new()));
        assert!(store.get().is_none());

        store.set(cred("ghp_one")).unwrap();
        assert_eq!(store.get().unwrap().expose(), "ghp_one");

        store.set(cred("ghp_two")).unwrap();
        assert_eq!(store.get().unwrap().expose(), "ghp_two");

        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(!store.is_present());
    }

    #[test]
    fn test_loads_existing_token() {
        let store = CredentialStore::with_backend(Box::new(MemoryBackend::with_token("ghp_saved")));
        assert_eq!(store.get().unwrap().expose(), "ghp_saved");
    }

    #[test]
    fn test_blank_stored_token_is_absent() {
        let store = CredentialStore::with_backend(Box::new(MemoryBackend::with_token("   ")));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_unreadable_backend_is_absent() {
        let store = CredentialStore::with_backend(Box::new(BrokenBackend));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_failed_persist_still_updates_memory() {
        let mut store = CredentialStore::with_backend(Box::new(BrokenBackend));

        assert!(store.set(cred("ghp_mem")).is_err());
        assert_eq!(store.get().unwrap().expose(), "ghp_mem");

        assert!(store.clear().is_err());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("credentials.json");
        let backend = FileBackend::new(path.clone());

        assert_eq!(backend.load().unwrap(), None);
        backend.save("gho_file").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some("gho_file"));

        let mut store = CredentialStore::with_backend(Box::new(FileBackend::new(path.clone())));
        assert_eq!(store.get().unwrap().expose(), "gho_file");
        store.clear().unwrap();
        assert!(!path.exists());

        // Deleting twice is fine.
        backend.delete().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_backend_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        FileBackend::new(path.clone()).save("gho_secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_backend_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"access_token":"gho_old"}"#).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let backend = FileBackend::new(path.clone());
        backend.save("gho_new").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(backend.load().unwrap().as_deref(), Some("gho_new"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_backend_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(FileBackend::new(path.clone()).load().is_err());
        let store = CredentialStore::with_backend(Box::new(FileBackend::new(path)));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_backend_kind_parse_and_display() {
        assert_eq!("keychain".parse::<BackendKind>().unwrap(), BackendKind::Keychain);
        assert_eq!(" FILE ".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("vault".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::File.to_string(), "file");
    }

    #[test]
    fn test_debug_hides_token() {
        let store = CredentialStore::with_backend(Box::new(MemoryBackend::with_token("ghp_hidden")));
        let printed = format!("{store:?}");
        assert!(!printed.contains("hidden"));
        assert!(printed.contains("present: true"));
    }
}
