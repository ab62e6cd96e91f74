// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CopilotBar` Core
//!
//! Core types and pure functions for the `CopilotBar` tray utility.
//!
//! This crate has no I/O. It provides:
//!
//! - Domain models (credential, usage payload, display options)
//! - Usage percentage math and threshold levels
//! - The tray text renderer
//! - Error types
//!
//! ## Key Types
//!
//! - [`Credential`] - Opaque bearer token (redacted in `Debug`)
//! - [`UsagePayload`] - One fetched snapshot of premium-request usage
//! - [`DisplayOptions`] - Show-bar / show-percent toggles
//! - [`UsageLevel`] - Normal / warning / critical bands
//!
//! ## Rendering
//!
//! ```
//! use copilotbar_core::{render, DisplayOptions};
//!
//! assert_eq!(render(45, DisplayOptions::default()), " ▰▰▱▱▱ 45%");
//! ```

pub mod error;
pub mod models;
pub mod render;

pub use error::CoreError;

pub use models::{
    // Credential
    Credential,
    // Display
    DisplayOptions,
    // Usage
    UsageLevel,
    UsagePayload,
    compute_percentage,
    parse_billing_end,
};

pub use render::{BAR_BLOCKS, EMPTY_GLYPH, FILLED_GLYPH, filled_blocks, render};
