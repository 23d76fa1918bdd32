//! # ESC/POS Control Commands
//!
//! This module implements the basic ESC/POS commands shared by most
//! Bluetooth thermal receipt printers (58mm and 80mm portables, kitchen
//! printers, and the many clones that speak the same dialect).
//!
//! ## Escape Sequence Structure
//!
//! Commands follow these patterns:
//! - Single byte: `LF`, `HT`
//! - Two bytes: `ESC @`
//! - Multi-byte with parameters: `ESC d n`, `GS V m`, `GS v 0 m xL xH yL yH data...`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for character size, barcodes, QR codes, raster images and the cutter.
pub const GS: u8 = 0x1D;

/// FS (File Separator) - Kanji / CJK mode command prefix
pub const FS: u8 = 0x1C;

/// LF (Line Feed) - Print the line buffer and advance one line
pub const LF: u8 = 0x0A;

/// HT (Horizontal Tab) - Advance to next tab position
pub const HT: u8 = 0x09;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and resets every mode to its power-on value.
/// Every rendered job starts with this command, and cancellation sends it
/// to leave the printer in a known state.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Enter CJK Character Mode (FS &)
///
/// Switches the printer to double-byte character mode so GBK/Big5 text is
/// printed as ideographs instead of pairs of Latin glyphs.
#[inline]
pub fn cjk_mode_on() -> Vec<u8> {
    vec![FS, b'&']
}

/// # Leave CJK Character Mode (FS .)
#[inline]
pub fn cjk_mode_off() -> Vec<u8> {
    vec![FS, b'.']
}

// ============================================================================
// PAPER FEED COMMANDS
// ============================================================================

/// # Print and Feed n Lines (ESC d n)
///
/// ## Protocol Details
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | ESC d n  |
/// | Hex     | 1B 64 n  |
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::feed_lines(3), vec![0x1B, 0x64, 3]);
/// ```
#[inline]
pub fn feed_lines(n: u8) -> Vec<u8> {
    vec![ESC, b'd', n]
}

/// # Print and Feed n Dots (ESC J n)
///
/// Feeds paper by `n` motion units (one dot on most 203 DPI mechanisms).
#[inline]
pub fn feed_dots(n: u8) -> Vec<u8> {
    vec![ESC, b'J', n]
}

// ============================================================================
// CUTTER CONTROL COMMANDS
// ============================================================================

/// # Cut Paper (GS V m)
///
/// | m | Cut |
/// |---|-----|
/// | 0 | Full cut |
/// | 1 | Partial cut (leaves a small hinge) |
///
/// Printers without a cutter ignore the command, so it is always safe to send.
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands;
///
/// assert_eq!(commands::cut(false), vec![0x1D, 0x56, 0x00]);
/// assert_eq!(commands::cut(true), vec![0x1D, 0x56, 0x01]);
/// ```
#[inline]
pub fn cut(partial: bool) -> Vec<u8> {
    vec![GS, b'V', if partial { 1 } else { 0 }]
}

/// # Feed Then Cut (GS V m n)
///
/// Feeds `n` motion units past the cutter, then cuts. `m = 65` for a full
/// cut, `m = 66` for a partial cut.
#[inline]
pub fn feed_and_cut(partial: bool, n: u8) -> Vec<u8> {
    vec![GS, b'V', if partial { 66 } else { 65 }, n]
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ## Example
///
/// ```
/// use thermalink::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(384), [0x80, 0x01]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================
