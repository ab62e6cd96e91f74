//! Tray display options.

use serde::{Deserialize, Serialize};

/// Which parts of the tray text are shown.
///
/// Both toggles default to `true`, including when a persisted value is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Show the five-block bar.
    pub show_bar: bool,
    /// Show the `NN%` label.
    pub show_percent: bool,
}

impl DisplayOptions {
    /// Creates options from explicit flags.
    pub fn new(show_bar: bool, show_percent: bool) -> Self {
        Self {
            show_bar,
            show_percent,
        }
    }

    /// Returns a copy with `show_bar` replaced.
    #[must_use]
    pub fn with_bar(self, show_bar: bool) -> Self {
        Self { show_bar, ..self }
    }

    /// Returns a copy with `show_percent` replaced.
    #[must_use]
    pub fn with_percent(self, show_percent: bool) -> Self {
        Self {
            show_percent,
            ..self
        }
    }

    /// Returns true if neither part is shown.
    pub fn is_hidden(&self) -> bool {
        !self.show_bar && !self.show_percent
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self::new(true, true)
    }
}
