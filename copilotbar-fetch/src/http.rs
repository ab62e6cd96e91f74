//! Shared HTTP client construction.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::FetchError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent on every request. GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!("copilotbar/", env!("CARGO_PKG_VERSION"));

/// Builds a `reqwest` client with the default timeout and user agent.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client() -> Result<Client, FetchError> {
    build_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Builds a `reqwest` client with a custom timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client_with_timeout(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Parses and checks an endpoint override.
///
/// Only `http` and `https` URLs are accepted.
///
/// # Errors
///
/// Returns [`FetchError::Network`] describing why the URL was rejected.
pub fn parse_endpoint(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::Network(format!("Invalid URL {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::Network(format!(
            "Unsupported URL scheme {other}: {raw}"
        ))),
    }
}
