//! # ESC/POS Barcode Commands
//!
//! This module implements 1D barcode and QR code generation for ESC/POS
//! printers. The printer draws the symbol itself; we only send the type
//! selector, the dimensions and the content.
//!
//! ## Supported Symbologies
//!
//! | Format | `GS k` m | Content | Length |
//! |--------|----------|---------|--------|
//! | UPC-A | 65 | digits | 11-12 |
//! | UPC-E | 66 | digits | 6-8, 11-12 |
//! | EAN-13 | 67 | digits | 12-13 |
//! | EAN-8 | 68 | digits | 7-8 |
//! | Code39 | 69 | `0-9 A-Z space $%*+-./` | 1-255 |
//! | ITF | 70 | digits, even count | 2-254 |
//! | Codabar | 71 | `0-9 $+-./:` with A-D start/stop | 2-255 |
//! | Code93 | 72 | ASCII | 1-255 |
//! | Code128 | 73 | ASCII | 1-253 |
//!
//! QR codes use the separate `GS ( k` function family. A QR request made
//! through [`barcode`] is redirected to [`qr::generate`].
//!
//! ## 1D Usage
//!
//! ```
//! use thermalink::protocol::barcode::{barcode, BarcodeFormat, BarcodeOptions};
//!
//! let cmd = barcode(BarcodeFormat::Code39, "HELLO-123", &BarcodeOptions::default()).unwrap();
//! assert_eq!(&cmd[..3], &[0x1D, 0x68, 80]); // GS h 80
//! ```

use serde::{Deserialize, Serialize};

use super::commands::GS;
use crate::error::{Result, ThermalinkError};

/// Maximum content length `GS k` function B can carry
const MAX_1D_LEN: usize = 255;

// ============================================================================
// FORMATS AND OPTIONS
// ============================================================================

/// Barcode symbology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
    Code93,
    Code128,
    /// 2D QR code, rendered with the `GS ( k` sequence
    Qr,
}

impl BarcodeFormat {
    /// `m` selector for `GS k m n data` (function B). `None` for QR.
    pub fn escpos_selector(self) -> Option<u8> {
        match self {
            Self::UpcA => Some(65),
            Self::UpcE => Some(66),
            Self::Ean13 => Some(67),
            Self::Ean8 => Some(68),
            Self::Code39 => Some(69),
            Self::Itf => Some(70),
            Self::Codabar => Some(71),
            Self::Code93 => Some(72),
            Self::Code128 => Some(73),
            Self::Qr => None,
        }
    }
}

/// Position of the human readable interpretation (HRI) text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HriPosition {
    None = 0,
    Above = 1,
    #[default]
    Below = 2,
    Both = 3,
}

/// Dimensions of a 1D barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeOptions {
    /// Bar height in dots (1-255)
    pub height: u8,
    /// Narrow module width in dots (2-6)
    pub module_width: u8,
    pub hri: HriPosition,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            height: 80,
            module_width: 2,
            hri: HriPosition::Below,
        }
    }
}

// ============================================================================
// CONTENT VALIDATION
// ============================================================================

fn invalid(format: BarcodeFormat, reason: impl std::fmt::Display) -> ThermalinkError {
    ThermalinkError::Encoding(format!("{:?} barcode: {}", format, reason))
}

fn require_digits(format: BarcodeFormat, content: &str) -> Result<()> {
    if content.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(invalid(format, "content must be numeric"))
    }
}

fn require_len(format: BarcodeFormat, content: &str, allowed: &[usize]) -> Result<()> {
    if allowed.contains(&content.len()) {
        Ok(())
    } else {
        Err(invalid(
            format,
            format!("length {} not in {:?}", content.len(), allowed),
        ))
    }
}

fn require_range(format: BarcodeFormat, content: &str, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&content.len()) {
        Ok(())
    } else {
        Err(invalid(
            format,
            format!("length {} outside {}-{}", content.len(), min, max),
        ))
    }
}

/// Check `content` against the constraints of `format`.
///
/// QR content is checked by [`qr::validate`] since its capacity depends on
/// the error correction level.
pub fn validate(format: BarcodeFormat, content: &str) -> Result<()> {
    if content.is_empty() {
        return Err(invalid(format, "content is empty"));
    }
    match format {
        BarcodeFormat::UpcA => {
            require_digits(format, content)?;
            require_len(format, content, &[11, 12])
        }
        BarcodeFormat::UpcE => {
            require_digits(format, content)?;
            require_len(format, content, &[6, 7, 8, 11, 12])
        }
        BarcodeFormat::Ean13 => {
            require_digits(format, content)?;
            require_len(format, content, &[12, 13])
        }
        BarcodeFormat::Ean8 => {
            require_digits(format, content)?;
            require_len(format, content, &[7, 8])
        }
        BarcodeFormat::Code39 => {
            require_range(format, content, 1, MAX_1D_LEN)?;
            let ok = content
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase() || b" $%*+-./".contains(&b));
            if ok {
                Ok(())
            } else {
                Err(invalid(format, "allowed characters are 0-9 A-Z space $%*+-./"))
            }
        }
        BarcodeFormat::Itf => {
            require_digits(format, content)?;
            require_range(format, content, 2, MAX_1D_LEN - 1)?;
            if content.len() % 2 == 0 {
                Ok(())
            } else {
                Err(invalid(format, "digit count must be even"))
            }
        }
        BarcodeFormat::Codabar => {
            require_range(format, content, 2, MAX_1D_LEN)?;
            let bytes = content.as_bytes();
            let is_guard = |b: u8| matches!(b.to_ascii_uppercase(), b'A'..=b'D');
            if !is_guard(bytes[0]) || !is_guard(bytes[bytes.len() - 1]) {
                return Err(invalid(format, "must start and end with A-D"));
            }
            let body_ok = bytes[1..bytes.len() - 1]
                .iter()
                .all(|b| b.is_ascii_digit() || b"$+-./:".contains(b));
            if body_ok {
                Ok(())
            } else {
                Err(invalid(format, "allowed characters are 0-9 $+-./:"))
            }
        }
        BarcodeFormat::Code93 => {
            require_range(format, content, 1, MAX_1D_LEN)?;
            if content.is_ascii() {
                Ok(())
            } else {
                Err(invalid(format, "content must be ASCII"))
            }
        }
        BarcodeFormat::Code128 => {
            // Two bytes are reserved for the {B code set prefix
            require_range(format, content, 1, MAX_1D_LEN - 2)?;
            if content.is_ascii() {
                Ok(())
            } else {
                Err(invalid(format, "content must be ASCII"))
            }
        }
        BarcodeFormat::Qr => qr::validate(content.as_bytes(), qr::QrErrorLevel::default()),
    }
}

// ============================================================================
// 1D BARCODE COMMANDS (GS h, GS w, GS H, GS k)
// ============================================================================

/// # Set Barcode Height (GS h n)
#[inline]
pub fn set_height(dots: u8) -> Vec<u8> {
    vec![GS, b'h', dots.max(1)]
}

/// # Set Barcode Module Width (GS w n)
#[inline]
pub fn set_module_width(dots: u8) -> Vec<u8> {
    vec![GS, b'w', dots.clamp(2, 6)]
}

/// # Select HRI Position (GS H n)
#[inline]
pub fn set_hri(position: HriPosition) -> Vec<u8> {
    vec![GS, b'H', position as u8]
}

/// # Print Barcode (GS k m n d1...dn)
///
/// Emits the dimension commands followed by the barcode itself.
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS h h GS w w GS H p GS k m n data |
/// | Hex     | 1D 68 h 1D 77 w 1D 48 p 1D 6B m n data |
///
/// Code128 content is prefixed with `{B` (code set B) unless the caller
/// already supplied a code set selector.
///
/// ## Errors
///
/// Invalid content for the symbology, or a module width outside 2-6, is an
/// [`ThermalinkError::Encoding`].
pub fn barcode(format: BarcodeFormat, content: &str, options: &BarcodeOptions) -> Result<Vec<u8>> {
    let Some(m) = format.escpos_selector() else {
        return qr::generate(content.as_bytes(), qr::DEFAULT_CELL_SIZE, qr::QrErrorLevel::default());
    };
    validate(format, content)?;
    if !(2..=6).contains(&options.module_width) {
        return Err(invalid(
            format,
            format!("module width {} outside 2-6", options.module_width),
        ));
    }
    if options.height == 0 {
        return Err(invalid(format, "height must be at least 1 dot"));
    }

    let mut data = Vec::with_capacity(content.len() + 2);
    if format == BarcodeFormat::Code128 && !content.starts_with('{') {
        data.extend_from_slice(b"{B");
    }
    data.extend_from_slice(content.as_bytes());

    let mut cmd = Vec::with_capacity(13 + data.len());
    cmd.extend(set_height(options.height));
    cmd.extend(set_module_width(options.module_width));
    cmd.extend(set_hri(options.hri));
    cmd.extend([GS, b'k', m, data.len() as u8]);
    cmd.extend(data);
    Ok(cmd)
}

// ============================================================================
// QR CODE COMMANDS
// ============================================================================

/// QR Code command builders (`GS ( k`, cn = 49)
///
/// A QR code is printed in five steps: select model, set cell size, set
/// error correction, store data, print stored data.
///
/// ```
/// use thermalink::protocol::barcode::qr::{self, QrErrorLevel};
///
/// let cmd = qr::generate(b"https://example.com", 6, QrErrorLevel::M).unwrap();
/// assert_eq!(&cmd[..9], &[0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);
/// ```
pub mod qr {
    use serde::{Deserialize, Serialize};

    use super::GS;
    use crate::error::{Result, ThermalinkError};

    /// Default module size in dots
    pub const DEFAULT_CELL_SIZE: u8 = 6;

    /// QR Code error correction level
    ///
    /// | Level | Recovery | Byte capacity (version 40) |
    /// |-------|----------|----------------------------|
    /// | L | ~7% | 2953 |
    /// | M | ~15% | 2331 |
    /// | Q | ~25% | 1663 |
    /// | H | ~30% | 1273 |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum QrErrorLevel {
        L,
        #[default]
        M,
        Q,
        H,
    }

    impl QrErrorLevel {
        /// Byte-mode capacity of a version 40 symbol at this level
        pub fn max_bytes(self) -> usize {
            match self {
                Self::L => 2953,
                Self::M => 2331,
                Self::Q => 1663,
                Self::H => 1273,
            }
        }

        fn code(self) -> u8 {
            match self {
                Self::L => 48,
                Self::M => 49,
                Self::Q => 50,
                Self::H => 51,
            }
        }
    }

    fn function(fn_code: u8, params: &[u8]) -> Vec<u8> {
        let len = (params.len() + 2) as u16;
        let mut cmd = Vec::with_capacity(5 + len as usize);
        cmd.extend([GS, b'(', b'k', len as u8, (len >> 8) as u8, 49, fn_code]);
        cmd.extend_from_slice(params);
        cmd
    }

    /// # Select Model 2 (GS ( k fn 165)
    pub fn set_model2() -> Vec<u8> {
        function(65, &[50, 0])
    }

    /// # Set Cell Size (GS ( k fn 167)
    pub fn set_cell_size(size: u8) -> Vec<u8> {
        function(67, &[size])
    }

    /// # Set Error Correction Level (GS ( k fn 169)
    pub fn set_error_correction(level: QrErrorLevel) -> Vec<u8> {
        function(69, &[level.code()])
    }

    /// # Store Symbol Data (GS ( k fn 180)
    ///
    /// `pL pH` counts the data plus the three bytes `cn fn m`.
    pub fn store_data(data: &[u8]) -> Vec<u8> {
        let mut params = Vec::with_capacity(1 + data.len());
        params.push(48);
        params.extend_from_slice(data);
        function(80, &params)
    }

    /// # Print Stored Symbol (GS ( k fn 181)
    pub fn print() -> Vec<u8> {
        function(81, &[48])
    }

    /// Check that `data` fits in a QR symbol at `level`.
    pub fn validate(data: &[u8], level: QrErrorLevel) -> Result<()> {
        if data.is_empty() {
            return Err(ThermalinkError::Encoding("QR content is empty".into()));
        }
        if data.len() > level.max_bytes() {
            return Err(ThermalinkError::Encoding(format!(
                "QR content of {} bytes exceeds {} byte capacity at level {:?}",
                data.len(),
                level.max_bytes(),
                level
            )));
        }
        Ok(())
    }

    /// Generate a complete QR code command sequence.
    ///
    /// ## Errors
    ///
    /// Cell size outside 1-16 or content over capacity.
    pub fn generate(data: &[u8], cell_size: u8, level: QrErrorLevel) -> Result<Vec<u8>> {
        validate(data, level)?;
        if !(1..=16).contains(&cell_size) {
            return Err(ThermalinkError::Encoding(format!(
                "QR cell size {} outside 1-16",
                cell_size
            )));
        }
        let mut cmd = Vec::with_capacity(data.len() + 40);
        cmd.extend(set_model2());
        cmd.extend(set_cell_size(cell_size));
        cmd.extend(set_error_correction(level));
        cmd.extend(store_data(data));
        cmd.extend(print());
        Ok(cmd)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::qr::QrErrorLevel;
    use super::*;

    #[test]
    fn test_code39_command() {
        let cmd = barcode(BarcodeFormat::Code39, "AB12", &BarcodeOptions::default()).unwrap();
        assert_eq!(
            cmd,
            vec![
                0x1D, 0x68, 80, // height
                0x1D, 0x77, 2, // module width
                0x1D, 0x48, 2, // HRI below
                0x1D, 0x6B, 69, 4, b'A', b'B', b'1', b'2',
            ]
        );
    }

    #[test]
    fn test_code128_gets_code_set_prefix() {
        let cmd = barcode(BarcodeFormat::Code128, "Hi", &BarcodeOptions::default()).unwrap();
        assert_eq!(&cmd[9..], &[0x1D, 0x6B, 73, 4, b'{', b'B', b'H', b'i']);
    }

    #[test]
    fn test_ean13_length() {
        assert!(validate(BarcodeFormat::Ean13, "590123412345").is_ok());
        assert!(validate(BarcodeFormat::Ean13, "5901234123457").is_ok());
        assert!(validate(BarcodeFormat::Ean13, "59012341234").is_err());
        assert!(validate(BarcodeFormat::Ean13, "59012341234X").is_err());
    }

    #[test]
    fn test_code39_charset() {
        assert!(validate(BarcodeFormat::Code39, "HELLO-123").is_ok());
        assert!(validate(BarcodeFormat::Code39, "hello").is_err());
    }

    #[test]
    fn test_itf_needs_even_digits() {
        assert!(validate(BarcodeFormat::Itf, "1234").is_ok());
        assert!(validate(BarcodeFormat::Itf, "123").is_err());
    }

    #[test]
    fn test_codabar_guards() {
        assert!(validate(BarcodeFormat::Codabar, "A1234B").is_ok());
        assert!(validate(BarcodeFormat::Codabar, "1234").is_err());
    }

    #[test]
    fn test_oversized_content_rejected() {
        let long = "A".repeat(300);
        let err = barcode(BarcodeFormat::Code39, &long, &BarcodeOptions::default()).unwrap_err();
        assert!(matches!(err, ThermalinkError::Encoding(_)));
    }

    #[test]
    fn test_bad_module_width_rejected() {
        let opts = BarcodeOptions {
            module_width: 9,
            ..Default::default()
        };
        assert!(barcode(BarcodeFormat::Code39, "A", &opts).is_err());
    }

    #[test]
    fn test_qr_format_redirected() {
        let via_barcode = barcode(BarcodeFormat::Qr, "hello", &BarcodeOptions::default()).unwrap();
        let direct = qr::generate(b"hello", qr::DEFAULT_CELL_SIZE, QrErrorLevel::M).unwrap();
        assert_eq!(via_barcode, direct);
        // No GS k in the output
        assert!(!via_barcode.windows(2).any(|w| w == [0x1D, 0x6B]));
    }

    #[test]
    fn test_qr_sequence() {
        let cmd = qr::generate(b"AB", 4, QrErrorLevel::H).unwrap();
        let expected: Vec<u8> = [
            vec![0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00],
            vec![0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, 0x04],
            vec![0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x33],
            vec![0x1D, 0x28, 0x6B, 0x05, 0x00, 0x31, 0x50, 0x30, b'A', b'B'],
            vec![0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30],
        ]
        .concat();
        assert_eq!(cmd, expected);
    }

    #[test]
    fn test_qr_capacity() {
        let data = vec![b'x'; 1274];
        assert!(qr::generate(&data, 4, QrErrorLevel::L).is_ok());
        assert!(qr::generate(&data, 4, QrErrorLevel::H).is_err());
    }

    #[test]
    fn test_qr_cell_size_range() {
        assert!(qr::generate(b"x", 0, QrErrorLevel::M).is_err());
        assert!(qr::generate(b"x", 17, QrErrorLevel::M).is_err());
    }
}
