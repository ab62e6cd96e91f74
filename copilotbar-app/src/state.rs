//! Observable scheduler state.
//!
//! The scheduler owns the only writer; front ends read it through a
//! `watch::Receiver<UsageState>`.

use copilotbar_core::{UsageLevel, UsagePayload};
use serde::Serialize;

// ============================================================================
// Auth Status
// ============================================================================

/// Progress of an interactive login.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthStatus {
    /// No login running.
    #[default]
    Idle,
    /// Requesting a device code.
    Starting,
    /// Waiting for the user to enter the code.
    AwaitingUser {
        /// Code to type at the verification page.
        user_code: String,
        /// Verification page.
        verification_uri: String,
    },
    /// The last login attempt failed.
    Failed {
        /// Why it failed.
        message: String,
    },
}

impl AuthStatus {
    /// Returns true while a login is in progress.
    pub fn is_pending(&self) -> bool {
        matches!(self, AuthStatus::Starting | AuthStatus::AwaitingUser { .. })
    }
}

// ============================================================================
// Usage State
// ============================================================================

/// Snapshot of everything a front end shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UsageState {
    /// Last successfully fetched usage.
    pub usage: Option<UsagePayload>,
    /// A fetch is in flight.
    pub loading: bool,
    /// Message from the last failed fetch.
    pub error: Option<String>,
    /// A credential is stored.
    pub has_credential: bool,
    /// Interactive login progress.
    pub auth: AuthStatus,
    /// Tray text as last published.
    pub display: String,
}

impl UsageState {
    /// Percentage of the last fetched usage, 0 when nothing is known.
    pub fn percentage(&self) -> u8 {
        self.usage.as_ref().map_or(0, UsagePayload::percentage)
    }

    /// Severity of the current percentage.
    pub fn level(&self) -> UsageLevel {
        UsageLevel::from_percent(self.percentage())
    }
}
