//! Usage-related types.
//!
//! - [`UsagePayload`] - One fetched snapshot of premium-request usage
//! - [`compute_percentage`] - Bounded usage percentage
//! - [`UsageLevel`] - Threshold bands used for tray colouring

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

// ============================================================================
// Thresholds
// ============================================================================

/// Usage above this percentage is shown as a warning.
pub const WARNING_THRESHOLD: u8 = 75;

/// Usage above this percentage is shown as critical.
pub const CRITICAL_THRESHOLD: u8 = 95;

// ============================================================================
// Percentage
// ============================================================================

/// Computes `round(100 * used / limit)` clamped into `[0, 100]`.
///
/// A limit of zero means "unlimited/undefined" and yields 0. Halves round up.
///
/// ```
/// use copilotbar_core::compute_percentage;
///
/// assert_eq!(compute_percentage(450, 500), 90);
/// assert_eq!(compute_percentage(0, 0), 0);
/// assert_eq!(compute_percentage(600, 500), 100);
/// ```
pub fn compute_percentage(used: u64, limit: u64) -> u8 {
    if limit == 0 {
        return 0;
    }
    let used = u128::from(used);
    let limit = u128::from(limit);
    let rounded = (used * 200 + limit) / (limit * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

// ============================================================================
// Billing Date
// ============================================================================

/// Parses an ISO 8601 billing-cycle end.
///
/// Accepts a full timestamp with offset, a timestamp without one, or a bare
/// date. Missing offsets are read as UTC; a bare date means midnight.
///
/// ```
/// use copilotbar_core::parse_billing_end;
///
/// let a = parse_billing_end("2025-07-01").unwrap();
/// let b = parse_billing_end("2025-07-01T00:00:00Z").unwrap();
/// assert_eq!(a, b);
/// ```
///
/// # Errors
///
/// Returns [`CoreError::InvalidData`] if no form matches.
pub fn parse_billing_end(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = raw.trim();
    if let Ok(at) = raw.parse::<DateTime<FixedOffset>>() {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(at) = raw.parse::<NaiveDateTime>() {
        return Ok(at.and_utc());
    }
    if let Ok(day) = raw.parse::<NaiveDate>() {
        return Ok(day.and_time(NaiveTime::MIN).and_utc());
    }
    Err(CoreError::InvalidData(format!(
        "billing_cycle_end `{raw}` is not an ISO 8601 date"
    )))
}

fn deserialize_billing_end<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_billing_end(&raw).map_err(serde::de::Error::custom)
}

// ============================================================================
// Usage Payload
// ============================================================================

/// Copilot premium-request usage as returned by the usage API.
///
/// Immutable once fetched; a successful fetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePayload {
    /// Premium requests consumed in the current billing cycle.
    pub premium_requests_used: u64,
    /// Premium requests allotted (0 = unlimited/undefined).
    pub premium_requests_limit: u64,
    /// End of the current billing cycle.
    #[serde(deserialize_with = "deserialize_billing_end")]
    pub billing_cycle_end: DateTime<Utc>,
}

impl UsagePayload {
    /// Creates a payload.
    pub fn new(used: u64, limit: u64, billing_cycle_end: DateTime<Utc>) -> Self {
        Self {
            premium_requests_used: used,
            premium_requests_limit: limit,
            billing_cycle_end,
        }
    }

    /// Parses a payload from a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the body does not match the shape.
    pub fn from_json(body: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Usage percentage in `[0, 100]`.
    pub fn percentage(&self) -> u8 {
        compute_percentage(self.premium_requests_used, self.premium_requests_limit)
    }

    /// Returns true if the plan reports no limit.
    pub fn is_unlimited(&self) -> bool {
        self.premium_requests_limit == 0
    }

    /// Requests left in the cycle, or `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        if self.is_unlimited() {
            None
        } else {
            Some(
                self.premium_requests_limit
                    .saturating_sub(self.premium_requests_used),
            )
        }
    }

    /// Threshold band for the current percentage.
    pub fn level(&self) -> UsageLevel {
        UsageLevel::from_percent(self.percentage())
    }

    /// Human-readable detail, e.g. `"450 / 500 (90%)"`.
    pub fn detail(&self) -> String {
        let pct = self.percentage();
        if self.is_unlimited() {
            format!("({pct}%)")
        } else {
            format!(
                "{} / {} ({pct}%)",
                self.premium_requests_used, self.premium_requests_limit
            )
        }
    }
}

// ============================================================================
// Usage Level
// ============================================================================

/// Usage band, used to colour the tray entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    /// At or below the warning threshold.
    #[default]
    Normal,
    /// Above 75%.
    Warning,
    /// Above 95%.
    Critical,
}

impl UsageLevel {
    /// Classifies a percentage.
    pub fn from_percent(percent: u8) -> Self {
        if percent > CRITICAL_THRESHOLD {
            Self::Critical
        } else if percent > WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    /// Lowercase label for logs and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for UsageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
