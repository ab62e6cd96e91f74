//! Tray text rendering.
//!
//! [`render`] is the single source of truth for what the tray shows:
//! a leading space, then an optional five-block bar and an optional
//! percentage label.

use crate::models::DisplayOptions;

/// Number of blocks in the bar.
pub const BAR_BLOCKS: u8 = 5;

/// Glyph for a filled block.
pub const FILLED_GLYPH: char = '▰';

/// Glyph for an empty block.
pub const EMPTY_GLYPH: char = '▱';

/// Number of filled blocks for a percentage: `round(percent / 100 * 5)`.
///
/// Ties round to even, so 10% (0.5 blocks) shows an empty bar and
/// 30% (1.5 blocks) shows two blocks. Percentages above 100 are clamped.
///
/// This differs from rounding halves up at 10%, 50% and 90%: those show
/// 0, 2 and 4 blocks here instead of 1, 3 and 5. Only 100% fills the bar.
pub fn filled_blocks(percent: u8) -> u8 {
    let percent = percent.min(100);
    // percent / 20 blocks, ties to even.
    let whole = percent / 20;
    let rem = percent % 20;
    match rem.cmp(&10) {
        std::cmp::Ordering::Less => whole,
        std::cmp::Ordering::Greater => whole + 1,
        std::cmp::Ordering::Equal => whole + whole % 2,
    }
}

/// Renders the tray text for a percentage and display options.
///
/// ```
/// use copilotbar_core::{render, DisplayOptions};
///
/// assert_eq!(render(45, DisplayOptions::new(true, true)), " ▰▰▱▱▱ 45%");
/// assert_eq!(render(45, DisplayOptions::new(false, true)), " 45%");
/// assert_eq!(render(45, DisplayOptions::new(false, false)), " ");
/// ```
pub fn render(percent: u8, opts: DisplayOptions) -> String {
    let percent = percent.min(100);
    let mut text = String::from(" ");

    if opts.show_bar {
        let filled = filled_blocks(percent);
        let empty = BAR_BLOCKS - filled;
        text.extend(std::iter::repeat_n(FILLED_GLYPH, usize::from(filled)));
        text.extend(std::iter::repeat_n(EMPTY_GLYPH, usize::from(empty)));
    }

    if opts.show_bar && opts.show_percent {
        text.push(' ');
    }

    if opts.show_percent {
        text.push_str(&percent.to_string());
        text.push('%');
    }

    text
}

// ============================================================================
// Tests
// ============================================================================
