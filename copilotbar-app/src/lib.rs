// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CopilotBar` App
//!
//! The refresh engine behind the `copilotbar` tray:
//!
//! - [`refresh`] - [`RefreshScheduler`], the task that owns all state
//! - [`state`] - [`UsageState`] published to front ends
//! - [`tray`] - [`TraySurface`] and the stdout implementation
//! - [`auth_server`] - [`AuthServer`], the closeable token callback page
//!
//! ## Example
//!
//! ```ignore
//! let (handle, task) = RefreshScheduler::spawn(deps).await;
//! handle.set_show_percent(false)?;
//! let state = handle.wait_for(|s| s.usage.is_some()).await?;
//! println!("{}", state.display);
//! ```

pub mod auth_server;
pub mod refresh;
pub mod state;
pub mod tray;

pub use auth_server::{AuthServer, AuthServerError, NoAuthServer};
pub use refresh::{
    RefreshScheduler, SchedulerClosed, SchedulerCommand, SchedulerDeps, SchedulerHandle,
};
pub use state::{AuthStatus, UsageState};
pub use tray::{RecordingTray, StdoutTray, TrayLog, TraySurface};
