//! Local token callback listener.
//!
//! Some front ends run a short-lived local page that hands the token back
//! to the app. The scheduler only needs to be able to close it.

use thiserror::Error;

/// Errors from closing the callback listener.
#[derive(Debug, Error)]
pub enum AuthServerError {
    /// Nothing was listening.
    #[error("Auth server not running")]
    NotRunning,

    /// Shutdown failed.
    #[error("Failed to stop auth server: {0}")]
    Shutdown(String),
}

/// A closeable token callback listener.
pub trait AuthServer: Send {
    /// Stops the listener.
    ///
    /// # Errors
    ///
    /// Returns [`AuthServerError::NotRunning`] when nothing was listening.
    fn close(&mut self) -> Result<(), AuthServerError>;
}

/// Front ends without a callback page.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthServer;

impl AuthServer for NoAuthServer {
    fn close(&mut self) -> Result<(), AuthServerError> {
        Err(AuthServerError::NotRunning)
    }
}
