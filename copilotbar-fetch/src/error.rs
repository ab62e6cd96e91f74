//! Fetch error types.

use thiserror::Error;

// ============================================================================
// Usage Fetch Error
// ============================================================================

/// Error type for usage fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or a non-auth HTTP error status.
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected (HTTP 401/403).
    #[error("Authentication failed (HTTP {status}) - please re-authenticate")]
    Auth {
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not match the expected shape.
    #[error("Failed to parse usage response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Returns true if the credential was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Network(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            FetchError::Network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

// ============================================================================
// Device Flow Error
// ============================================================================

/// Error type for the OAuth device flow.
#[derive(Debug, Error)]
pub enum DeviceFlowError {
    /// The device code request was not accepted.
    #[error("Failed to start GitHub login: {0}")]
    Start(String),

    /// The user denied the authorization request.
    #[error("GitHub login was denied")]
    Denied,

    /// The device code expired before the user authorized.
    #[error("GitHub login expired - user did not authorize in time")]
    Expired,

    /// The flow was cancelled locally (e.g. a manual token was saved).
    #[error("GitHub login was cancelled")]
    Cancelled,

    /// Transport failure while polling.
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    Parse(String),

    /// The token endpoint returned an error code outside RFC 8628.
    #[error("Unexpected OAuth error: {0}")]
    Unexpected(String),
}

impl DeviceFlowError {
    /// Returns true for a local cancellation, which callers treat as silent.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeviceFlowError::Cancelled)
    }
}

impl From<reqwest::Error> for DeviceFlowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeviceFlowError::Network(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            DeviceFlowError::Network(format!("Connection failed: {err}"))
        } else {
            DeviceFlowError::Network(err.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
