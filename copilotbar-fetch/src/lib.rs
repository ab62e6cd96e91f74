// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CopilotBar` Fetch
//!
//! Network side of `CopilotBar`:
//!
//! - [`usage`] - [`UsageClient`] trait and the GitHub implementation
//! - [`device_flow`] - OAuth 2.0 Device Authorization Grant (RFC 8628)
//! - [`http`] - Shared `reqwest` client construction
//! - [`error`] - [`FetchError`] and [`DeviceFlowError`]
//!
//! Neither client retries. Retry policy belongs to the caller's schedule.
//!
//! ## Example
//!
//! ```ignore
//! use copilotbar_fetch::{DeviceAuthFlow, GitHubDeviceFlowApi, GitHubUsageClient, UsageClient};
//!
//! let flow = DeviceAuthFlow::new(GitHubDeviceFlowApi::new()?);
//! let session = flow.start_auth_flow().await?;
//! println!("Open {} and enter {}", session.verification_uri, session.user_code);
//!
//! let credential = flow.complete_auth_flow(session).wait().await?;
//! let usage = GitHubUsageClient::new()?.fetch_usage(&credential).await?;
//! ```

pub mod device_flow;
pub mod error;
pub mod http;
pub mod usage;

pub use device_flow::{
    AccessTokenResponse, AuthorizationHandle, DeviceAuthFlow, DeviceAuthSession,
    DeviceCodeResponse, DeviceFlowApi, DeviceFlowState, GitHubDeviceFlowApi, PollResponse,
};
pub use error::{DeviceFlowError, FetchError};
pub use http::build_client;
pub use usage::{GitHubUsageClient, UsageClient};
