//! Core error types for `CopilotBar`.

use thiserror::Error;

/// Core error type for `CopilotBar` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid data from an API response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Empty or whitespace-only credential.
    #[error("Credential is empty")]
    EmptyCredential,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
