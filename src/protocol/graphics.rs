//! # ESC/POS Raster Graphics
//!
//! This module implements the `GS v 0` raster bit image command.
//!
//! ## Bit Packing
//!
//! Image data is packed as bytes where each bit represents one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```
//!
//! The caller supplies pixels that are already dithered to 1 bit per dot;
//! this module never converts grayscale.
//!
//! ## Bluetooth Buffers
//!
//! Cheap portable printers have a receive buffer of a few kilobytes. A tall
//! image sent as one `GS v 0` block can overflow it, so [`raster_bands`]
//! splits the image into several stacked raster commands of bounded height.

use super::commands::{GS, u16_le};
use crate::error::{Result, ThermalinkError};

/// Width in bytes of a row of `width_dots` dots
#[inline]
pub fn width_bytes(width_dots: u16) -> usize {
    width_dots.div_ceil(8) as usize
}

/// Check that `data` is exactly one packed 1bpp image of the given size.
pub fn validate_image(width_dots: u16, height: u16, data: &[u8]) -> Result<()> {
    if width_dots == 0 || height == 0 {
        return Err(ThermalinkError::Encoding(format!(
            "image size {}x{} must be non-zero",
            width_dots, height
        )));
    }
    let expected = width_bytes(width_dots) * height as usize;
    if data.len() != expected {
        return Err(ThermalinkError::Encoding(format!(
            "image data is {} bytes, expected {} ({} bytes x {} rows)",
            data.len(),
            expected,
            width_bytes(width_dots),
            height
        )));
    }
    Ok(())
}

// ============================================================================
// RASTER BIT IMAGE (GS v 0)
// ============================================================================

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// ## Protocol Details
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `m`: Scale mode (0 = normal)
/// - `xL, xH`: Width in **bytes**, little-endian
/// - `yL, yH`: Height in dots, little-endian
/// - `d1...dk`: k = width_bytes × height bytes, row-major
///
/// ## Example
///
/// ```
/// use thermalink::protocol::graphics;
///
/// let data = vec![0xAA; 48 * 10];
/// let cmd = graphics::raster(384, 10, &data).unwrap();
///
/// assert_eq!(&cmd[..8], &[0x1D, 0x76, 0x30, 0, 48, 0, 10, 0]);
/// assert_eq!(cmd.len(), 8 + 480);
/// ```
pub fn raster(width_dots: u16, height: u16, data: &[u8]) -> Result<Vec<u8>> {
    validate_image(width_dots, height, data)?;

    let [xl, xh] = u16_le(width_bytes(width_dots) as u16);
    let [yl, yh] = u16_le(height);

    let mut cmd = Vec::with_capacity(8 + data.len());
    cmd.extend([GS, b'v', b'0', 0, xl, xh, yl, yh]);
    cmd.extend_from_slice(data);
    Ok(cmd)
}

/// Split an image into stacked raster commands of at most `max_rows` rows.
///
/// ```text
/// 1000 rows, max_rows = 256:
///   raster(w, 256, rows 0..256)
///   raster(w, 256, rows 256..512)
///   raster(w, 256, rows 512..768)
///   raster(w, 232, rows 768..1000)
/// ```
pub fn raster_bands(width_dots: u16, height: u16, data: &[u8], max_rows: u16) -> Result<Vec<u8>> {
    validate_image(width_dots, height, data)?;
    let max_rows = max_rows.max(1);
    let row_bytes = width_bytes(width_dots);

    let mut out = Vec::with_capacity(data.len() + 8 * (height / max_rows + 1) as usize);
    let mut row = 0u16;
    while row < height {
        let rows = max_rows.min(height - row);
        let start = row as usize * row_bytes;
        let end = start + rows as usize * row_bytes;
        out.extend(raster(width_dots, rows, &data[start..end])?);
        row += rows;
    }
    Ok(out)
}

/// Invert every bit, for languages where a set bit means "no dot".
pub fn invert(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| !b).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_bytes_rounds_up() {
        assert_eq!(width_bytes(8), 1);
        assert_eq!(width_bytes(9), 2);
        assert_eq!(width_bytes(384), 48);
        assert_eq!(width_bytes(576), 72);
    }

    #[test]
    fn test_raster_header() {
        let data = vec![0xFF; 2 * 300];
        let cmd = raster(12, 300, &data).unwrap();
        // 12 dots → 2 bytes; 300 rows = 0x012C
        assert_eq!(&cmd[..8], &[0x1D, 0x76, 0x30, 0x00, 2, 0, 0x2C, 0x01]);
        assert_eq!(cmd.len(), 8 + 600);
    }

    #[test]
    fn test_raster_rejects_wrong_length() {
        assert!(raster(16, 2, &[0xFF; 3]).is_err());
        assert!(raster(0, 2, &[]).is_err());
    }

    #[test]
    fn test_raster_bands_split() {
        let data: Vec<u8> = (0..10u8).collect(); // 1 byte wide, 10 rows
        let cmd = raster_bands(8, 10, &data, 4).unwrap();

        let expected = [
            raster(8, 4, &data[0..4]).unwrap(),
            raster(8, 4, &data[4..8]).unwrap(),
            raster(8, 2, &data[8..10]).unwrap(),
        ]
        .concat();
        assert_eq!(cmd, expected);
    }

    #[test]
    fn test_raster_bands_single_band_matches_raster() {
        let data = vec![0x0F; 48 * 20];
        assert_eq!(
            raster_bands(384, 20, &data, 256).unwrap(),
            raster(384, 20, &data).unwrap()
        );
    }

    #[test]
    fn test_invert() {
        assert_eq!(invert(&[0x00, 0xF0, 0xFF]), vec![0xFF, 0x0F, 0x00]);
    }
}
