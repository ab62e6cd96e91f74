//! Domain models for `CopilotBar`.
//!
//! ## Submodules
//!
//! - [`credential`] - Opaque bearer token
//! - [`usage`] - Usage payload, percentage math, usage levels
//! - [`display`] - Tray display toggles

mod credential;
mod display;
mod usage;

pub use credential::Credential;
pub use display::DisplayOptions;
pub use usage::{UsageLevel, UsagePayload, compute_percentage, parse_billing_end};
#[cfg(test)]
mod serde_tests;
