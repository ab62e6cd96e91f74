//! GitHub Device Flow OAuth implementation.
//!
//! This module implements the OAuth 2.0 Device Authorization Grant
//! (RFC 8628) against GitHub.
//!
//! ## Flow
//!
//! 1. **Start**: POST to `/login/device/code` to get a device code and user code
//! 2. **Display**: Show the user the verification URL and user code
//! 3. **Poll**: POST to `/login/oauth/access_token` every `interval` seconds
//! 4. **Complete**: Hand the access token to the caller
//!
//! ## States
//!
//! ```text
//! Idle -> Requesting -> AwaitingUser -> Polling -> Completed
//!                                               -> Expired
//!                                               -> Denied
//!                                               -> Cancelled
//! ```
//!
//! Polling runs on its own task. [`DeviceAuthFlow::complete_auth_flow`]
//! returns an [`AuthorizationHandle`] whose [`cancel`](AuthorizationHandle::cancel)
//! stops the loop before its next request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use copilotbar_core::Credential;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::DeviceFlowError;
use crate::http::build_client;

// ============================================================================
// Constants
// ============================================================================

/// GitHub's OAuth device code endpoint.
const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";

/// GitHub's OAuth access token endpoint.
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// GitHub Copilot's OAuth client ID.
pub const COPILOT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

/// OAuth scopes requested.
const COPILOT_SCOPES: &str = "read:user";

/// Device code grant type.
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Interval used when the server does not send one (RFC 8628 §3.2).
const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Lower bound on the poll interval.
const MIN_INTERVAL_SECS: u64 = 1;

/// Increase applied on every `slow_down` (RFC 8628 §3.5).
pub const SLOW_DOWN_STEP_SECS: u64 = 5;

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

// ============================================================================
// Wire Types
// ============================================================================

/// Device code response from GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    /// The device verification code.
    pub device_code: String,

    /// The user verification code to display.
    pub user_code: String,

    /// The verification URL.
    pub verification_uri: String,

    /// Seconds until the codes expire.
    pub expires_in: u64,

    /// Minimum polling interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Access token response from GitHub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    /// The OAuth access token.
    pub access_token: String,

    /// Token type (usually "bearer").
    #[serde(default)]
    pub token_type: String,

    /// Scopes granted.
    #[serde(default)]
    pub scope: String,
}

/// Error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

/// One answer from the token endpoint.
#[derive(Debug, Clone)]
pub enum PollResponse {
    /// User authorized - here's the access token.
    Authorized(AccessTokenResponse),

    /// User has not yet authorized - keep polling.
    Pending,

    /// Polling too fast. `interval` is the server's new interval, if sent.
    SlowDown {
        /// Interval advertised with the error, in seconds.
        interval: Option<u64>,
    },

    /// Access was denied by the user.
    Denied,

    /// The device code expired.
    Expired,
}

/// Classifies a token endpoint body.
///
/// GitHub answers device-flow errors with HTTP 200 and an `error` field,
/// so the status code is not consulted.
///
/// # Errors
///
/// Returns [`DeviceFlowError::Unexpected`] for unknown error codes and
/// [`DeviceFlowError::Parse`] for bodies that are neither a token nor an error.
pub fn parse_poll_response(body: &str) -> Result<PollResponse, DeviceFlowError> {
    if let Ok(token) = serde_json::from_str::<AccessTokenResponse>(body) {
        return Ok(PollResponse::Authorized(token));
    }

    if let Ok(error) = serde_json::from_str::<OAuthError>(body) {
        return match error.error.as_str() {
            "authorization_pending" => Ok(PollResponse::Pending),
            "slow_down" => Ok(PollResponse::SlowDown {
                interval: error.interval,
            }),
            "access_denied" => Ok(PollResponse::Denied),
            "expired_token" => Ok(PollResponse::Expired),
            other => {
                warn!(error = %other, description = ?error.error_description, "Unknown OAuth error");
                Err(DeviceFlowError::Unexpected(other.to_string()))
            }
        };
    }

    Err(DeviceFlowError::Parse(format!(
        "Unexpected token endpoint response ({} bytes)",
        body.len()
    )))
}

// ============================================================================
// Session
// ============================================================================

/// An active device authorization session.
#[derive(Debug, Clone)]
pub struct DeviceAuthSession {
    /// Code used when polling.
    pub device_code: String,
    /// Code the user types at the verification page.
    pub user_code: String,
    /// Where the user enters the code.
    pub verification_uri: String,
    /// Current minimum wait between polls.
    pub interval: Duration,
    /// Lifetime the server granted to the codes.
    pub expires_in: Duration,
    /// Monotonic deadline after which no poll is issued.
    pub expires_at: Instant,
}

impl DeviceAuthSession {
    /// Builds a session from a device code response received now.
    pub fn from_response(response: DeviceCodeResponse) -> Self {
        let interval = Duration::from_secs(response.interval.max(MIN_INTERVAL_SECS));
        let expires_in = Duration::from_secs(response.expires_in);
        Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            interval,
            expires_in,
            expires_at: Instant::now() + expires_in,
        }
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// ============================================================================
// State
// ============================================================================

/// Observable device flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceFlowState {
    /// No flow running.
    #[default]
    Idle,
    /// Device code request in flight.
    Requesting,
    /// Codes issued, polling not yet started.
    AwaitingUser,
    /// Polling the token endpoint.
    Polling,
    /// Token received.
    Completed,
    /// Codes expired.
    Expired,
    /// User denied access.
    Denied,
    /// Cancelled locally.
    Cancelled,
    /// Ended on an unexpected server answer.
    Failed,
}

impl DeviceFlowState {
    fn after(result: &Result<Credential, DeviceFlowError>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(DeviceFlowError::Expired) => Self::Expired,
            Err(DeviceFlowError::Denied) => Self::Denied,
            Err(DeviceFlowError::Cancelled) => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }
}

// ============================================================================
// API Trait
// ============================================================================

/// The two device flow endpoints.
#[async_trait]
pub trait DeviceFlowApi: Send + Sync {
    /// Requests a device/user code pair.
    async fn request_device_code(&self) -> Result<DeviceCodeResponse, DeviceFlowError>;

    /// Polls the token endpoint once.
    async fn poll_access_token(&self, device_code: &str) -> Result<PollResponse, DeviceFlowError>;
}

// ============================================================================
// GitHub API
// ============================================================================

/// Device flow endpoints on github.com.
#[derive(Debug, Clone)]
pub struct GitHubDeviceFlowApi {
    http: reqwest::Client,
    client_id: String,
    device_code_url: Url,
    access_token_url: Url,
}

impl GitHubDeviceFlowApi {
    /// Creates an API handle with the Copilot client ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, DeviceFlowError> {
        Self::with_client_id(COPILOT_CLIENT_ID)
    }

    /// Creates an API handle with a custom client ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_client_id(client_id: impl Into<String>) -> Result<Self, DeviceFlowError> {
        Self::with_endpoints(client_id, DEVICE_CODE_URL, ACCESS_TOKEN_URL)
    }

    /// Creates an API handle against custom endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is invalid or the HTTP client cannot be built.
    pub fn with_endpoints(
        client_id: impl Into<String>,
        device_code_url: &str,
        access_token_url: &str,
    ) -> Result<Self, DeviceFlowError> {
        let http = build_client().map_err(|e| DeviceFlowError::Network(e.to_string()))?;
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| DeviceFlowError::Start(format!("Invalid URL {raw}: {e}")))
        };
        Ok(Self {
            http,
            client_id: client_id.into(),
            device_code_url: parse(device_code_url)?,
            access_token_url: parse(access_token_url)?,
        })
    }

    /// Returns the client ID.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }
}

#[async_trait]
impl DeviceFlowApi for GitHubDeviceFlowApi {
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    async fn request_device_code(&self) -> Result<DeviceCodeResponse, DeviceFlowError> {
        debug!("Requesting device code");

        let response = self
            .http
            .post(self.device_code_url.clone())
            .headers(Self::build_headers())
            .form(&[("client_id", self.client_id.as_str()), ("scope", COPILOT_SCOPES)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DeviceFlowError::Start(format!("HTTP {status}: {body}")));
        }

        let start: DeviceCodeResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Failed to parse device code response");
            DeviceFlowError::Start(format!("JSON parse error: {e}"))
        })?;

        debug!(
            user_code = %start.user_code,
            verification_uri = %start.verification_uri,
            expires_in = start.expires_in,
            interval = start.interval,
            "Device code issued"
        );

        Ok(start)
    }

    #[instrument(skip(self, device_code))]
    async fn poll_access_token(&self, device_code: &str) -> Result<PollResponse, DeviceFlowError> {
        debug!("Polling token endpoint");

        let response = self
            .http
            .post(self.access_token_url.clone())
            .headers(Self::build_headers())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await?;

        let body = response.text().await?;
        parse_poll_response(&body)
    }
}

// ============================================================================
// Device Auth Flow
// ============================================================================

/// Device flow driver.
///
/// Holds the observable [`DeviceFlowState`]; one session at a time.
pub struct DeviceAuthFlow<A: ?Sized> {
    api: Arc<A>,
    state: Arc<watch::Sender<DeviceFlowState>>,
}

impl<A: DeviceFlowApi + 'static> DeviceAuthFlow<A> {
    /// Creates a flow over the given endpoints.
    pub fn new(api: A) -> Self {
        Self::from_arc(Arc::new(api))
    }
}

impl<A: DeviceFlowApi + ?Sized + 'static> DeviceAuthFlow<A> {
    /// Creates a flow sharing an existing API handle.
    pub fn from_arc(api: Arc<A>) -> Self {
        let (state, _) = watch::channel(DeviceFlowState::Idle);
        Self {
            api,
            state: Arc::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> DeviceFlowState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<DeviceFlowState> {
        self.state.subscribe()
    }

    /// Requests a device/user code pair.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceFlowError::Start`] on any failure; the state returns to `Idle`.
    #[instrument(skip(self))]
    pub async fn start_auth_flow(&self) -> Result<DeviceAuthSession, DeviceFlowError> {
        self.state.send_replace(DeviceFlowState::Requesting);

        match self.api.request_device_code().await {
            Ok(response) => {
                let session = DeviceAuthSession::from_response(response);
                self.state.send_replace(DeviceFlowState::AwaitingUser);
                info!(
                    user_code = %session.user_code,
                    verification_uri = %session.verification_uri,
                    "Device flow started"
                );
                Ok(session)
            }
            Err(e) => {
                self.state.send_replace(DeviceFlowState::Idle);
                warn!(error = %e, "Device flow start failed");
                Err(match e {
                    DeviceFlowError::Start(_) => e,
                    other => DeviceFlowError::Start(other.to_string()),
                })
            }
        }
    }

    /// Polls for the token on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn complete_auth_flow(&self, session: DeviceAuthSession) -> AuthorizationHandle {
        self.complete_auth_flow_with(session, CancellationToken::new())
    }

    /// Like [`complete_auth_flow`](Self::complete_auth_flow), but polling stops
    /// as soon as `cancel` is cancelled.
    ///
    /// Pass a child of an owner's token so the owner can stop polling
    /// synchronously, without waiting for another task to forward it.
    pub fn complete_auth_flow_with(
        &self,
        session: DeviceAuthSession,
        cancel: CancellationToken,
    ) -> AuthorizationHandle {
        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let result = poll_until_complete(api.as_ref(), &session, &token, &state).await;
            state.send_replace(DeviceFlowState::after(&result));
            result
        });

        AuthorizationHandle { cancel, task }
    }
}

/// The polling loop. Waits a full interval before every poll.
async fn poll_until_complete<A: DeviceFlowApi + ?Sized>(
    api: &A,
    session: &DeviceAuthSession,
    cancel: &CancellationToken,
    state: &watch::Sender<DeviceFlowState>,
) -> Result<Credential, DeviceFlowError> {
    let mut interval = session.interval;

    if cancel.is_cancelled() {
        return Err(DeviceFlowError::Cancelled);
    }
    state.send_replace(DeviceFlowState::Polling);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DeviceFlowError::Cancelled),
            () = tokio::time::sleep(interval) => {}
        }

        if session.is_expired() {
            info!("Device code expired before authorization");
            return Err(DeviceFlowError::Expired);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DeviceFlowError::Cancelled),
            response = api.poll_access_token(&session.device_code) => response,
        };

        if cancel.is_cancelled() {
            return Err(DeviceFlowError::Cancelled);
        }

        match response {
            Ok(PollResponse::Authorized(token)) => {
                info!("Device flow completed");
                return Credential::new(&token.access_token)
                    .map_err(|_| DeviceFlowError::Parse("empty access token".to_string()));
            }
            Ok(PollResponse::Pending) => {
                debug!("Authorization pending");
            }
            Ok(PollResponse::SlowDown { interval: advertised }) => {
                let bumped = interval + Duration::from_secs(SLOW_DOWN_STEP_SECS);
                let advertised = Duration::from_secs(advertised.unwrap_or(0));
                interval = bumped.max(advertised);
                debug!(interval_secs = interval.as_secs(), "Server asked to slow down");
            }
            Ok(PollResponse::Denied) => {
                info!("Device flow denied by user");
                return Err(DeviceFlowError::Denied);
            }
            Ok(PollResponse::Expired) => {
                info!("Device code expired");
                return Err(DeviceFlowError::Expired);
            }
            // The deadline bounds retries of transport failures.
            Err(DeviceFlowError::Network(e)) => {
                warn!(error = %e, "Token poll failed, retrying next interval");
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Authorization Handle
// ============================================================================

/// Handle to a background polling task.
#[derive(Debug)]
pub struct AuthorizationHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<Credential, DeviceFlowError>>,
}

impl AuthorizationHandle {
    /// Stops polling. No request is issued after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a token that cancels this flow.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns true once the polling task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the flow to end.
    ///
    /// # Errors
    ///
    /// Returns the flow's terminal error, or [`DeviceFlowError::Cancelled`]
    /// if it was cancelled.
    pub async fn wait(self) -> Result<Credential, DeviceFlowError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DeviceFlowError::Cancelled),
            Err(e) => Err(DeviceFlowError::Unexpected(format!("polling task failed: {e}"))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
