//! # Printer Configuration
//!
//! Hardware characteristics of the printer a job is rendered for.
//!
//! ## Presets
//!
//! | Preset | Language | Width (dots) | Resolution |
//! |--------|----------|--------------|------------|
//! | [`PrinterConfig::receipt_58mm`] | ESC/POS | 384 | 203 DPI |
//! | [`PrinterConfig::receipt_80mm`] | ESC/POS | 576 | 203 DPI |
//! | [`PrinterConfig::label_203dpi`] | TSPL | 320 (40mm) | 203 DPI |
//!
//! ## Usage
//!
//! ```
//! use thermalink::printer::PrinterConfig;
//!
//! let config = PrinterConfig::receipt_80mm();
//! println!("Print width: {} dots ({:.0} mm)",
//!          config.width_dots,
//!          config.width_mm());
//! ```
//!
//! Every field has a default, so a TOML `[printer]` table only needs the
//! values that differ:
//!
//! ```toml
//! [printer]
//! language = "tspl"
//! dpi = 300
//!
//! [printer.label]
//! width_mm = 50.0
//! height_mm = 25.0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermalinkError};
use crate::protocol::encoding::TextEncoding;
use crate::protocol::tspl::Dpi;

/// Command language spoken by the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterLanguage {
    /// Streaming receipt language: bytes print as they arrive
    #[default]
    EscPos,
    /// Label page language: commands describe a label, `PRINT` renders it
    Tspl,
}

/// Label stock geometry and print settings (TSPL only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub width_mm: f32,
    pub height_mm: f32,
    /// Gap between labels
    pub gap_mm: f32,
    /// Print speed in inches per second (1-12)
    pub speed: u8,
    /// Darkness (0-15)
    pub density: u8,
    /// Blank border kept around label content
    pub margin_dots: u32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            width_mm: 40.0,
            height_mm: 30.0,
            gap_mm: 2.0,
            speed: 4,
            density: 8,
            margin_dots: 16,
        }
    }
}

/// # Printer Configuration
///
/// ## Physical Properties
///
/// - **width_dots**: Maximum printable width in dots
/// - **dpi**: Print head resolution
///
/// ## Bluetooth Tuning
///
/// - **mtu**: Largest write the link accepts in one chunk
/// - **chunk_delay_ms**: Pause between chunks so the printer buffer drains
/// - **max_raster_rows**: Maximum rows per raster command
///
/// ## Calculations
///
/// ```text
/// dots_per_mm = dpi / 25.4
/// width_mm = width_dots / dots_per_mm
///
/// For an 80mm receipt printer:
///   dots_per_mm = 203 / 25.4 ≈ 8
///   width_mm = 576 / 8 = 72mm
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Printer model name, used in logs
    pub name: String,
    pub language: PrinterLanguage,
    pub dpi: Dpi,
    /// Maximum print width in dots (ESC/POS)
    pub width_dots: u16,
    /// Text encoding of the printer font (ESC/POS)
    pub encoding: TextEncoding,
    pub mtu: usize,
    pub chunk_delay_ms: u64,
    /// Lines fed before the automatic cut (ESC/POS)
    pub feed_lines: u8,
    /// Cut after every non-raw payload
    pub auto_cut: bool,
    pub max_raster_rows: u16,
    pub label: LabelConfig,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::receipt_58mm()
    }
}

impl PrinterConfig {
    /// 58mm paper receipt printer, the common portable Bluetooth size.
    pub fn receipt_58mm() -> Self {
        Self {
            name: "ESC/POS 58mm".to_string(),
            language: PrinterLanguage::EscPos,
            dpi: Dpi::Dpi203,
            width_dots: 384,
            encoding: TextEncoding::Gbk,
            mtu: 512,
            chunk_delay_ms: 20,
            feed_lines: 3,
            auto_cut: true,
            max_raster_rows: 256,
            label: LabelConfig::default(),
        }
    }

    /// 80mm paper receipt printer.
    ///
    /// ```text
    /// ├── 4mm ──┼────── 72mm printable ──────┼── 4mm ──┤
    /// │ margin  │         576 dots           │ margin  │
    /// ```
    pub fn receipt_80mm() -> Self {
        Self {
            name: "ESC/POS 80mm".to_string(),
            width_dots: 576,
            ..Self::receipt_58mm()
        }
    }

    /// 203 DPI TSPL label printer with 40x30mm stock.
    pub fn label_203dpi() -> Self {
        let label = LabelConfig::default();
        Self {
            name: "TSPL 203dpi".to_string(),
            language: PrinterLanguage::Tspl,
            width_dots: Dpi::Dpi203.mm_to_dots(label.width_mm).min(u16::MAX as u32) as u16,
            encoding: TextEncoding::Ascii,
            label,
            ..Self::receipt_58mm()
        }
    }

    /// Calculate dots per millimeter
    ///
    /// ```
    /// use thermalink::printer::PrinterConfig;
    ///
    /// let config = PrinterConfig::receipt_80mm();
    /// assert!((config.dots_per_mm() - 8.0).abs() < 0.1);
    /// ```
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        self.dpi.dots_per_mm()
    }

    /// Calculate print width in millimeters
    #[inline]
    pub fn width_mm(&self) -> f32 {
        self.width_dots as f32 / self.dots_per_mm()
    }

    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u32 {
        self.dpi.mm_to_dots(mm)
    }

    #[inline]
    pub fn dots_to_mm(&self, dots: u32) -> f32 {
        self.dpi.dots_to_mm(dots)
    }

    /// Reject values no printer accepts.
    pub fn validate(&self) -> Result<()> {
        if self.mtu == 0 {
            return Err(ThermalinkError::Config("printer.mtu must be at least 1".into()));
        }
        if self.width_dots == 0 {
            return Err(ThermalinkError::Config("printer.width_dots must be non-zero".into()));
        }
        if self.max_raster_rows == 0 {
            return Err(ThermalinkError::Config(
                "printer.max_raster_rows must be non-zero".into(),
            ));
        }
        if self.language == PrinterLanguage::Tspl {
            let label = &self.label;
            if label.width_mm <= 0.0 || label.height_mm <= 0.0 {
                return Err(ThermalinkError::Config(format!(
                    "label size {}x{} mm must be positive",
                    label.width_mm, label.height_mm
                )));
            }
            if !(1..=12).contains(&label.speed) {
                return Err(ThermalinkError::Config(format!(
                    "label speed {} outside 1-12",
                    label.speed
                )));
            }
            if label.density > 15 {
                return Err(ThermalinkError::Config(format!(
                    "label density {} outside 0-15",
                    label.density
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(PrinterConfig::receipt_58mm().width_dots, 384);
        assert_eq!(PrinterConfig::receipt_80mm().width_dots, 576);

        let label = PrinterConfig::label_203dpi();
        assert_eq!(label.language, PrinterLanguage::Tspl);
        assert_eq!(label.width_dots, 320);
    }

    #[test]
    fn test_mm_conversion() {
        let config = PrinterConfig::receipt_80mm();
        assert_eq!(config.mm_to_dots(10.0), 80);
        assert!((config.width_mm() - 72.0).abs() < 0.2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PrinterConfig = toml::from_str(
            r#"
            language = "tspl"
            dpi = 300

            [label]
            width_mm = 50.0
            "#,
        )
        .unwrap();
        assert_eq!(config.language, PrinterLanguage::Tspl);
        assert_eq!(config.dpi, Dpi::Dpi300);
        assert_eq!(config.label.width_mm, 50.0);
        assert_eq!(config.label.height_mm, 30.0);
        assert_eq!(config.mtu, 512);
    }

    #[test]
    fn test_unsupported_dpi_is_rejected() {
        let result: std::result::Result<PrinterConfig, _> = toml::from_str("dpi = 600");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(PrinterConfig::default().validate().is_ok());

        let mut config = PrinterConfig::label_203dpi();
        config.label.density = 20;
        assert!(matches!(config.validate(), Err(ThermalinkError::Config(_))));

        let mut config = PrinterConfig::default();
        config.mtu = 0;
        assert!(config.validate().is_err());
    }
}
