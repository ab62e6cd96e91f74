//! Tray surfaces.
//!
//! A [`TraySurface`] receives the rendered usage text and, optionally, the
//! usage level for colouring. The scheduler only calls it when a value
//! actually changes.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use copilotbar_core::UsageLevel;
use tracing::warn;

/// The OS status-area entry the usage text is published to.
pub trait TraySurface: Send {
    /// Replaces the tray text.
    fn set_text(&mut self, text: &str);

    /// Updates the colour band. Surfaces without colour ignore it.
    fn set_level(&mut self, _level: UsageLevel) {}
}

// ============================================================================
// Stdout Tray
// ============================================================================

/// Writes each update to stdout on its own line.
#[derive(Debug, Default)]
pub struct StdoutTray {
    show_level: bool,
    level: UsageLevel,
}

impl StdoutTray {
    /// Creates a plain text tray.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tray that prefixes lines with the level when not normal.
    pub fn with_level() -> Self {
        Self {
            show_level: true,
            level: UsageLevel::Normal,
        }
    }

    fn format_line(&self, text: &str) -> String {
        if self.show_level && self.level != UsageLevel::Normal {
            format!("[{}]{text}", self.level)
        } else {
            text.to_string()
        }
    }
}

impl TraySurface for StdoutTray {
    fn set_text(&mut self, text: &str) {
        let line = self.format_line(text);
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            warn!(error = %e, "Failed to write tray text");
        }
    }

    fn set_level(&mut self, level: UsageLevel) {
        self.level = level;
    }
}

// ============================================================================
// Recording Tray
// ============================================================================

/// Keeps every update in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTray {
    log: Arc<Mutex<TrayLog>>,
}

/// Updates seen by a [`RecordingTray`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrayLog {
    /// Every text published, in order.
    pub texts: Vec<String>,
    /// Every level published, in order.
    pub levels: Vec<UsageLevel>,
}

impl RecordingTray {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> TrayLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Most recent text, if any.
    pub fn last_text(&self) -> Option<String> {
        self.snapshot().texts.last().cloned()
    }
}

impl TraySurface for RecordingTray {
    fn set_text(&mut self, text: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .texts
            .push(text.to_string());
    }

    fn set_level(&mut self, level: UsageLevel) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .push(level);
    }
}
