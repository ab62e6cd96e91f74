//! Copilot usage client.
//!
//! One `GET` with a bearer credential, decoded into [`UsagePayload`].
//! Status mapping:
//!
//! - 2xx: body parsed, [`FetchError::Parse`] on shape mismatch
//! - 401/403: [`FetchError::Auth`]
//! - anything else or transport failure: [`FetchError::Network`]

use async_trait::async_trait;
use copilotbar_core::{Credential, UsagePayload};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::FetchError;
use crate::http::{build_client, parse_endpoint};

// ============================================================================
// Constants
// ============================================================================

/// Default Copilot usage endpoint.
pub const DEFAULT_USAGE_URL: &str = "https://api.github.com/user/copilot_billing/usage";

/// GitHub API version header.
const GITHUB_API_VERSION: &str = "2022-11-28";

// ============================================================================
// Usage Client Trait
// ============================================================================

/// Fetches current Copilot usage for a credential.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait UsageClient: Send + Sync {
    /// Fetches the current usage payload.
    async fn fetch_usage(&self, credential: &Credential) -> Result<UsagePayload, FetchError>;
}

// ============================================================================
// GitHub Usage Client
// ============================================================================

/// Usage client backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubUsageClient {
    http: reqwest::Client,
    url: Url,
}

impl GitHubUsageClient {
    /// Creates a client for the default endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_url(DEFAULT_USAGE_URL)
    }

    /// Creates a client for a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn with_url(url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            http: build_client()?,
            url: parse_endpoint(url)?,
        })
    }

    /// Returns the endpoint this client queries.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn build_headers(credential: &Credential) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|e| FetchError::Network(format!("Invalid token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        Ok(headers)
    }
}

#[async_trait]
impl UsageClient for GitHubUsageClient {
    #[instrument(skip(self, credential), fields(url = %self.url))]
    async fn fetch_usage(&self, credential: &Credential) -> Result<UsagePayload, FetchError> {
        debug!("Fetching Copilot usage");

        let headers = Self::build_headers(credential)?;
        let response = self
            .http
            .get(self.url.clone())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "Usage API rejected credential");
            return Err(FetchError::Auth {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            warn!(status = status.as_u16(), "Usage API returned error status");
            return Err(FetchError::Network(format!("HTTP {status}")));
        }

        let body = response.text().await?;
        let payload = UsagePayload::from_json(&body).map_err(|e| {
            warn!(error = %e, len = body.len(), "Failed to parse usage response");
            FetchError::Parse(e.to_string())
        })?;

        debug!(
            used = payload.premium_requests_used,
            limit = payload.premium_requests_limit,
            "Fetched Copilot usage"
        );

        Ok(payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
