//! # ESC/POS Text Styling Commands
//!
//! ## Text Styling Overview
//!
//! | Style | Command | Effect |
//! |-------|---------|--------|
//! | Bold | ESC E n | **Emphasized** text |
//! | Underline | ESC - n | Underlined text (1 or 2 dots) |
//! | Inverse | GS B n | White on black |
//! | Alignment | ESC a n | Left / center / right |
//! | Size | GS ! n | 1×–8× width and height |
//!
//! ## Text Alignment
//!
//! ```text
//! Left aligned (default)    |LEFT TEXT
//! Center aligned            |  CENTER TEXT
//! Right aligned             |      RIGHT TEXT
//! ```

use serde::{Deserialize, Serialize};

use super::commands::{ESC, GS};
use crate::error::{Result, ThermalinkError};

/// Largest character multiplier accepted by `GS !`
pub const MAX_SIZE_MULTIPLIER: u8 = 8;

// ============================================================================
// TEXT ALIGNMENT
// ============================================================================

/// Text alignment options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left = 0,
    Center = 1,
    Right = 2,
}

/// # Set Justification (ESC a n)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC a n |
/// | Hex     | 1B 61 n |
///
/// Takes effect at the start of the next line.
///
/// ## Example
///
/// ```
/// use thermalink::protocol::text::{align, Alignment};
///
/// assert_eq!(align(Alignment::Center), vec![0x1B, 0x61, 0x01]);
/// ```
pub fn align(alignment: Alignment) -> Vec<u8> {
    vec![ESC, b'a', alignment as u8]
}

// ============================================================================
// EMPHASIS, UNDERLINE, INVERSE
// ============================================================================

/// # Emphasized Mode (ESC E n)
///
/// `n = 1` turns bold on, `n = 0` turns it off.
#[inline]
pub fn bold(enabled: bool) -> Vec<u8> {
    vec![ESC, b'E', enabled as u8]
}

/// # Underline Mode (ESC - n)
///
/// | n | Effect |
/// |---|--------|
/// | 0 | Off |
/// | 1 | 1-dot underline |
/// | 2 | 2-dot underline |
///
/// Underline does not apply to rotated characters or white/black reversed text.
#[inline]
pub fn underline(enabled: bool) -> Vec<u8> {
    vec![ESC, b'-', enabled as u8]
}

/// # White/Black Reverse Mode (GS B n)
#[inline]
pub fn inverse(enabled: bool) -> Vec<u8> {
    vec![GS, b'B', enabled as u8]
}

// ============================================================================
// CHARACTER SIZE
// ============================================================================

/// # Select Character Size (GS ! n)
///
/// The high nibble holds the width multiplier minus one and the low nibble
/// the height multiplier minus one:
///
/// ```text
/// n = ((width - 1) << 4) | (height - 1)
///
/// 1×1 → 0x00    2×2 → 0x11    8×8 → 0x77
/// ```
///
/// ## Errors
///
/// Multipliers outside 1–8 are rejected rather than clamped, so a bad style
/// never produces a silently different receipt.
///
/// ## Example
///
/// ```
/// use thermalink::protocol::text::size;
///
/// assert_eq!(size(2, 2).unwrap(), vec![0x1D, 0x21, 0x11]);
/// assert!(size(9, 1).is_err());
/// ```
pub fn size(width_mult: u8, height_mult: u8) -> Result<Vec<u8>> {
    for (axis, value) in [("width", width_mult), ("height", height_mult)] {
        if !(1..=MAX_SIZE_MULTIPLIER).contains(&value) {
            return Err(ThermalinkError::Encoding(format!(
                "text {} multiplier {} out of range 1-{}",
                axis, value, MAX_SIZE_MULTIPLIER
            )));
        }
    }
    let n = ((width_mult - 1) << 4) | (height_mult - 1);
    Ok(vec![GS, b'!', n])
}

// ============================================================================
// TEXT STYLE BUILDER
// ============================================================================

/// Style applied to a block of text.
///
/// ```
/// use thermalink::protocol::text::{TextStyle, Alignment};
///
/// let style = TextStyle::new()
///     .alignment(Alignment::Center)
///     .bold(true)
///     .size(2, 2);
///
/// let commands = style.to_commands().unwrap();
/// assert!(commands.starts_with(&[0x1B, 0x61, 0x01]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub bold: bool,
    pub underline: bool,
    pub inverse: bool,
    pub alignment: Alignment,
    pub width_mult: u8,
    pub height_mult: u8,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            bold: false,
            underline: false,
            inverse: false,
            alignment: Alignment::Left,
            width_mult: 1,
            height_mult: 1,
        }
    }
}

impl TextStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bold(mut self, enabled: bool) -> Self {
        self.bold = enabled;
        self
    }

    pub fn underline(mut self, enabled: bool) -> Self {
        self.underline = enabled;
        self
    }

    pub fn inverse(mut self, enabled: bool) -> Self {
        self.inverse = enabled;
        self
    }

    pub fn alignment(mut self, a: Alignment) -> Self {
        self.alignment = a;
        self
    }

    pub fn size(mut self, width: u8, height: u8) -> Self {
        self.width_mult = width;
        self.height_mult = height;
        self
    }

    /// Generate command bytes for this style.
    ///
    /// Every attribute is emitted explicitly so the output does not depend on
    /// whatever mode the previous job left behind.
    pub fn to_commands(&self) -> Result<Vec<u8>> {
        let mut cmds = Vec::with_capacity(15);
        cmds.extend(align(self.alignment));
        cmds.extend(bold(self.bold));
        cmds.extend(underline(self.underline));
        cmds.extend(inverse(self.inverse));
        cmds.extend(size(self.width_mult, self.height_mult)?);
        Ok(cmds)
    }

    /// Commands restoring the default style
    pub fn reset() -> Vec<u8> {
        let mut cmds = Vec::with_capacity(15);
        cmds.extend(align(Alignment::Left));
        cmds.extend(bold(false));
        cmds.extend(underline(false));
        cmds.extend(inverse(false));
        cmds.extend([GS, b'!', 0]);
        cmds
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(align(Alignment::Left), vec![0x1B, 0x61, 0x00]);
        assert_eq!(align(Alignment::Center), vec![0x1B, 0x61, 0x01]);
        assert_eq!(align(Alignment::Right), vec![0x1B, 0x61, 0x02]);
    }

    #[test]
    fn test_bold_underline_inverse() {
        assert_eq!(bold(true), vec![0x1B, 0x45, 0x01]);
        assert_eq!(bold(false), vec![0x1B, 0x45, 0x00]);
        assert_eq!(underline(true), vec![0x1B, 0x2D, 0x01]);
        assert_eq!(inverse(true), vec![0x1D, 0x42, 0x01]);
    }

    #[test]
    fn test_size() {
        assert_eq!(size(1, 1).unwrap(), vec![0x1D, 0x21, 0x00]);
        assert_eq!(size(2, 1).unwrap(), vec![0x1D, 0x21, 0x10]);
        assert_eq!(size(1, 3).unwrap(), vec![0x1D, 0x21, 0x02]);
        assert_eq!(size(8, 8).unwrap(), vec![0x1D, 0x21, 0x77]);
    }

    #[test]
    fn test_size_rejects_out_of_range() {
        assert!(size(0, 1).is_err());
        assert!(size(1, 9).is_err());
    }

    #[test]
    fn test_text_style_commands() {
        let style = TextStyle::new()
            .alignment(Alignment::Right)
            .bold(true)
            .inverse(true)
            .size(2, 3);
        let cmds = style.to_commands().unwrap();
        assert_eq!(
            cmds,
            vec![
                0x1B, 0x61, 0x02, // right
                0x1B, 0x45, 0x01, // bold
                0x1B, 0x2D, 0x00, // no underline
                0x1D, 0x42, 0x01, // inverse
                0x1D, 0x21, 0x12, // 2x3
            ]
        );
    }

    #[test]
    fn test_reset_matches_default_style() {
        assert_eq!(TextStyle::reset(), TextStyle::default().to_commands().unwrap());
    }

    #[test]
    fn test_style_deserializes_with_defaults() {
        let style: TextStyle = serde_json::from_str(r#"{"bold": true, "alignment": "center"}"#).unwrap();
        assert!(style.bold);
        assert_eq!(style.alignment, Alignment::Center);
        assert_eq!(style.width_mult, 1);
    }
}
